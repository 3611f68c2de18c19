//! Agent profiles — the configuration resolved per turn to drive
//! generation and retrieval.
//!
//! Agent CRUD lives elsewhere; this crate only defines the profile shape
//! and the lookup contract the orchestrator consumes.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything the generation pipeline needs to know about an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: AgentSettings,
    /// Knowledge bases scoping context retrieval. Empty = retrieval skipped.
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    /// Intent labels configured on the agent (informational only here).
    #[serde(default)]
    pub intents: Vec<String>,
}

/// LLM settings attached to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            model: d_model(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            system_prompt: String::new(),
        }
    }
}

fn d_provider() -> String {
    "openai".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    2048
}

/// Lookup contract for agent configuration, resolved at turn time.
///
/// Implemented over the config file in-process; a deployment backed by a
/// relational store plugs in its own implementation.
#[async_trait::async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_profile(&self, agent_id: &str) -> Result<Option<AgentProfile>>;
}
