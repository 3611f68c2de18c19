//! Wire-dialect selection.
//!
//! Provider entries are a closed set: every configured id resolves to an
//! OpenAI-compatible adapter, the Anthropic adapter, or the diagnostic
//! fallback. An agent naming an unknown provider still gets a complete
//! turn (one diagnostic chunk, then done) instead of a dropped stream.

use parlor_domain::error::Result;
use parlor_domain::stream::{BoxStream, StreamEvent};

use crate::traits::{ChatProvider, GenerationRequest};

/// The wire dialects the engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAi,
    Anthropic,
    Unsupported,
}

impl Dialect {
    /// Resolve a config `kind` string (or provider id, when `kind` is
    /// absent) to a dialect.
    pub fn parse(s: &str) -> Self {
        match s {
            "openai" | "openai_compat" => Dialect::OpenAi,
            "anthropic" => Dialect::Anthropic,
            _ => Dialect::Unsupported,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostic fallback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fallback adapter for provider ids no dialect covers.
///
/// Emits the diagnostic text as a single token so the turn completes
/// normally and the message lands in the transcript, where an operator
/// will see the misconfiguration.
pub struct UnsupportedProvider {
    requested: String,
    message: String,
}

impl UnsupportedProvider {
    pub fn new(requested: &str) -> Self {
        Self {
            requested: requested.to_owned(),
            message: format!(
                "Provider '{requested}' is not supported. Please configure OpenAI or Anthropic."
            ),
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for UnsupportedProvider {
    async fn chat_stream(
        &self,
        _req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        tracing::warn!(provider = %self.requested, "turn routed to unsupported provider");
        let message = self.message.clone();
        Ok(Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Token { text: message });
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("unsupported_provider".into()),
            });
        }))
    }

    fn provider_id(&self) -> &str {
        &self.requested
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
