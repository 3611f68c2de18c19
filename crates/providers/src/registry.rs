//! Provider registry.
//!
//! Instantiates all configured provider adapters at startup (API keys
//! are resolved from the environment at this point) and resolves the
//! provider id an agent's settings name at turn time.

use std::collections::HashMap;
use std::sync::Arc;

use parlor_domain::config::LlmConfig;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::selector::{Dialect, UnsupportedProvider};
use crate::traits::ChatProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated provider adapters, keyed by config id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Entries that fail to initialize (missing API key env var, bad
    /// client config) are logged and skipped rather than aborting
    /// startup; turns routed to them get the diagnostic fallback.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn ChatProvider>> = HashMap::new();

        for (id, pc) in &config.providers {
            let dialect = Dialect::parse(pc.dialect(id));
            let result = match dialect {
                Dialect::OpenAi => OpenAiProvider::from_config(id, pc, config.default_timeout_ms)
                    .map(|p| Arc::new(p) as Arc<dyn ChatProvider>),
                Dialect::Anthropic => {
                    AnthropicProvider::from_config(id, pc, config.default_timeout_ms)
                        .map(|p| Arc::new(p) as Arc<dyn ChatProvider>)
                }
                Dialect::Unsupported => {
                    tracing::warn!(
                        provider_id = %id,
                        kind = %pc.dialect(id),
                        "unknown provider kind in config, skipping"
                    );
                    continue;
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %id, kind = ?dialect, "registered LLM provider");
                    providers.insert(id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %id,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!(
                "no LLM providers initialized; AI turns will return a \
                 diagnostic response until auth is configured"
            );
        }

        Self { providers }
    }

    /// Register a provider instance directly. Used by tests to install
    /// scripted backends.
    pub fn insert(&mut self, id: &str, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(id.to_owned(), provider);
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve the provider an agent names. Unknown ids resolve to the
    /// diagnostic fallback, so every turn reaches a terminal event.
    pub fn select(&self, provider_id: &str) -> Arc<dyn ChatProvider> {
        match self.providers.get(provider_id) {
            Some(p) => p.clone(),
            None => Arc::new(UnsupportedProvider::new(provider_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// All registered provider ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_domain::config::ProviderConfig;

    fn provider_entry(kind: Option<&str>, env: &str) -> ProviderConfig {
        ProviderConfig {
            kind: kind.map(String::from),
            base_url: None,
            api_key_env: env.into(),
            default_model: None,
        }
    }

    #[test]
    fn missing_key_env_skips_provider() {
        let mut config = LlmConfig::default();
        config.providers.insert(
            "openai".into(),
            provider_entry(None, "PARLOR_TEST_NO_SUCH_KEY_1357"),
        );

        let registry = ProviderRegistry::from_config(&config);
        assert!(registry.is_empty());
    }

    #[test]
    fn registered_provider_resolves_by_id() {
        let var = "PARLOR_TEST_REGISTRY_KEY_2468";
        std::env::set_var(var, "sk-test");

        let mut config = LlmConfig::default();
        config
            .providers
            .insert("openai".into(), provider_entry(None, var));
        config
            .providers
            .insert("corp-proxy".into(), provider_entry(Some("openai"), var));

        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.list(), vec!["corp-proxy", "openai"]);
        assert_eq!(registry.select("openai").provider_id(), "openai");

        std::env::remove_var(var);
    }

    #[test]
    fn unknown_id_selects_diagnostic_fallback() {
        let registry = ProviderRegistry::default();
        let provider = registry.select("mystery");
        assert_eq!(provider.provider_id(), "mystery");
    }
}
