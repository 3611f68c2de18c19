use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider instances (key = provider id, e.g. "openai", "anthropic").
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Request timeout applied by the HTTP client per provider call.
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_timeout_ms: d_timeout_ms(),
        }
    }
}

/// One configured provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Wire dialect: "openai" (OpenAI-compatible) or "anthropic".
    /// Defaults to the provider id itself.
    #[serde(default)]
    pub kind: Option<String>,
    /// Base URL override (self-hosted gateways, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Default model when the agent settings don't name one.
    #[serde(default)]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the wire dialect for a provider entry.
    pub fn dialect<'a>(&'a self, provider_id: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(provider_id)
    }
}

fn d_timeout_ms() -> u64 {
    120_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_and_dialect_defaults_to_id() {
        let cfg: LlmConfig = toml::from_str(
            r#"
            [providers.openai]
            api_key_env = "OPENAI_API_KEY"

            [providers.corp-proxy]
            kind = "openai"
            base_url = "https://llm.internal/v1"
            api_key_env = "CORP_LLM_KEY"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.providers["openai"].dialect("openai"), "openai");
        assert_eq!(cfg.providers["corp-proxy"].dialect("corp-proxy"), "openai");
        assert_eq!(cfg.default_timeout_ms, 120_000);
    }
}
