mod llm;
mod observability;
mod retrieval;
mod server;
mod sessions;
mod webhooks;

pub use llm::*;
pub use observability::*;
pub use retrieval::*;
pub use server::*;
pub use sessions::*;
pub use webhooks::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agent::{AgentProfile, AgentSettings};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Agent definitions (key = agent_id). A deployment backed by a
    /// relational agent store leaves this empty and injects its own
    /// directory implementation.
    #[serde(default)]
    pub agents: HashMap<String, ConfigAgent>,
}

/// An agent defined inline in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigAgent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: AgentSettings,
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    #[serde(default)]
    pub intents: Vec<String>,
}

impl ConfigAgent {
    /// Materialize the profile for a given agent id.
    pub fn to_profile(&self, agent_id: &str) -> AgentProfile {
        AgentProfile {
            agent_id: agent_id.to_owned(),
            name: self.name.clone(),
            settings: self.settings.clone(),
            knowledge_base_ids: self.knowledge_base_ids.clone(),
            intents: self.intents.clone(),
        }
    }
}
