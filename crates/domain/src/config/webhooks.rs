use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound webhooks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outbound notification webhooks for handoff lifecycle events.
///
/// Deliveries are fire-and-forget: failures are logged, never retried,
/// and never affect the session state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// Destination URL. `None` disables outbound notifications.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the HMAC signing secret.
    /// When set, deliveries carry an `X-Parlor-Signature` header.
    #[serde(default = "d_secret_env")]
    pub secret_env: String,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            secret_env: d_secret_env(),
            timeout_ms: d_timeout_ms(),
        }
    }
}

fn d_secret_env() -> String {
    "PARLOR_WEBHOOK_SECRET".into()
}
fn d_timeout_ms() -> u64 {
    5_000
}
