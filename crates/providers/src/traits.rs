use parlor_domain::chat::ChatMessage;
use parlor_domain::error::Result;
use parlor_domain::stream::{BoxStream, StreamEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A backend-agnostic streaming completion request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Instructions sent ahead of the conversation (retrieved context is
    /// already folded in by the pipeline).
    pub system_prompt: Option<String>,
    /// Conversation history, oldest first, ending with the current user turn.
    pub messages: Vec<ChatMessage>,
    /// Model identifier, taken from the agent settings.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every generation backend adapter implements.
///
/// Adapters translate between the internal request/event types and one
/// provider's HTTP wire format. Generation is always streamed; a turn's
/// chunks flow straight from here to the client transport.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start a streaming completion and return the event stream.
    ///
    /// The returned stream ends with exactly one `Done` event unless it
    /// fails, in which case the failure is the last item.
    async fn chat_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// The config id of this provider instance.
    fn provider_id(&self) -> &str;
}
