//! Config-backed agent directory.

use std::collections::HashMap;
use std::sync::Arc;

use parlor_domain::agent::{AgentDirectory, AgentProfile};
use parlor_domain::config::Config;
use parlor_domain::error::Result;

/// [`AgentDirectory`] over the `[agents.*]` config sections. Profiles
/// are materialized once at startup; config reload means restart.
pub struct StaticAgentDirectory {
    profiles: HashMap<String, AgentProfile>,
}

impl StaticAgentDirectory {
    pub fn from_config(config: &Config) -> Arc<Self> {
        let profiles = config
            .agents
            .iter()
            .map(|(id, agent)| (id.clone(), agent.to_profile(id)))
            .collect::<HashMap<_, _>>();
        tracing::info!(agents = profiles.len(), "agent directory ready");
        Arc::new(Self { profiles })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait::async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn get_profile(&self, agent_id: &str) -> Result<Option<AgentProfile>> {
        Ok(self.profiles.get(agent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_configured_agent() {
        let config: Config = toml::from_str(
            r#"
            [agents.support]
            name = "Support"

            [agents.support.settings]
            provider = "anthropic"
        "#,
        )
        .unwrap();

        let dir = StaticAgentDirectory::from_config(&config);
        let profile = dir.get_profile("support").await.unwrap().unwrap();
        assert_eq!(profile.settings.provider, "anthropic");
        assert!(dir.get_profile("missing").await.unwrap().is_none());
    }
}
