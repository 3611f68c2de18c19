//! Outbound webhook notifications for handoff lifecycle events.
//!
//! Modeled as an injectable interface so the state machine stays free
//! of delivery concerns. Deliveries are fire-and-forget: failures are
//! logged and never retried, and never affect session state.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use parlor_domain::config::WebhooksConfig;
use parlor_domain::error::{Error, Result};
use parlor_domain::trace::TraceEvent;

type HmacSha256 = Hmac<Sha256>;

/// An event worth telling the outside world about.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifyEvent {
    HandoffRequested {
        tenant_id: String,
        session_id: String,
        handoff_id: String,
        reason: String,
        priority: String,
    },
    HandoffAccepted {
        tenant_id: String,
        session_id: String,
        handoff_id: String,
        human_agent_id: String,
    },
    HandoffEnded {
        tenant_id: String,
        session_id: String,
        handoff_id: String,
        resolution: String,
    },
}

impl NotifyEvent {
    fn name(&self) -> &'static str {
        match self {
            NotifyEvent::HandoffRequested { .. } => "handoff_requested",
            NotifyEvent::HandoffAccepted { .. } => "handoff_accepted",
            NotifyEvent::HandoffEnded { .. } => "handoff_ended",
        }
    }
}

/// Outbound notification sink.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

/// Notifier used when no webhook endpoint is configured.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: NotifyEvent) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook notifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Posts each event as JSON to the configured endpoint, signed with
/// HMAC-SHA256 over the body when a secret is available.
pub struct WebhookNotifier {
    http: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(cfg: &WebhooksConfig, endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let secret = std::env::var(&cfg.secret_env).ok().filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!(
                env_var = %cfg.secret_env,
                "webhook signing secret not set, deliveries will be unsigned"
            );
        }

        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            secret,
        })
    }

    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent) {
        let body = match serde_json::to_vec(&event) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "webhook payload serialization failed");
                return;
            }
        };

        let mut rb = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(signature) = self.sign(&body) {
            rb = rb.header("X-Parlor-Signature", signature);
        }

        let start = Instant::now();
        match rb.body(body).send().await {
            Ok(resp) => {
                TraceEvent::WebhookDelivered {
                    event: event.name().to_owned(),
                    status: resp.status().as_u16(),
                    duration_ms: start.elapsed().as_millis() as u64,
                }
                .emit();
                if !resp.status().is_success() {
                    tracing::warn!(
                        event = event.name(),
                        status = resp.status().as_u16(),
                        "webhook endpoint returned non-success"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "webhook delivery failed");
            }
        }
    }
}

/// Build the notifier the config calls for.
pub fn from_config(cfg: &WebhooksConfig) -> Result<std::sync::Arc<dyn Notifier>> {
    match cfg.endpoint.as_deref() {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "webhook notifier ready");
            Ok(std::sync::Arc::new(WebhookNotifier::new(cfg, endpoint)?))
        }
        None => Ok(std::sync::Arc::new(NoopNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex_hmac() {
        let notifier = WebhookNotifier {
            http: reqwest::Client::new(),
            endpoint: "http://localhost/hook".into(),
            secret: Some("top-secret".into()),
        };

        let sig = notifier.sign(b"{\"event\":\"handoff_requested\"}").unwrap();
        assert!(sig.starts_with("sha256="));
        // Same body, same signature.
        assert_eq!(
            sig,
            notifier.sign(b"{\"event\":\"handoff_requested\"}").unwrap()
        );
        // Different body, different signature.
        assert_ne!(sig, notifier.sign(b"{}").unwrap());
    }

    #[test]
    fn unsigned_without_secret() {
        let notifier = WebhookNotifier {
            http: reqwest::Client::new(),
            endpoint: "http://localhost/hook".into(),
            secret: None,
        };
        assert!(notifier.sign(b"{}").is_none());
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = NotifyEvent::HandoffAccepted {
            tenant_id: "t1".into(),
            session_id: "s1".into(),
            handoff_id: "h1".into(),
            human_agent_id: "agent-7".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "handoff_accepted");
        assert_eq!(json["human_agent_id"], "agent-7");
    }
}
