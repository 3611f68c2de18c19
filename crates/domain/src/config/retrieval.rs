use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the external vector-search service.
///
/// Retrieval is best-effort: when `base_url` is unset or a call fails,
/// generation proceeds with empty context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Vector-search service endpoint. `None` disables retrieval.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the service API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Number of snippets requested per query.
    #[serde(default = "d_top_k")]
    pub top_k: usize,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: d_api_key_env(),
            top_k: d_top_k(),
            timeout_ms: d_timeout_ms(),
        }
    }
}

fn d_api_key_env() -> String {
    "PARLOR_RETRIEVAL_KEY".into()
}
fn d_top_k() -> usize {
    5
}
fn d_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_disabled_by_default() {
        let cfg = RetrievalConfig::default();
        assert!(cfg.base_url.is_none());
        assert_eq!(cfg.top_k, 5);
    }
}
