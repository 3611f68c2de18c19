use serde::Serialize;

/// Structured trace events emitted across all Parlor crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionOpened {
        session_id: String,
        tenant_id: String,
        agent_id: String,
        kind: String,
    },
    SessionEnded {
        session_id: String,
        duration_ms: i64,
        message_count: u64,
    },
    SessionCleared {
        session_id: String,
        messages_deleted: usize,
    },
    TranscriptAppend {
        session_id: String,
        role: String,
        sequence: u64,
    },
    HandoffRequested {
        session_id: String,
        handoff_id: String,
        priority: String,
        estimated_wait_minutes: u32,
    },
    HandoffAccepted {
        session_id: String,
        handoff_id: String,
        human_agent_id: String,
    },
    HandoffEnded {
        session_id: String,
        handoff_id: String,
        resolution: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        session_id: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    RetrievalDegraded {
        session_id: String,
        reason: String,
    },
    ContextRetrieved {
        session_id: String,
        snippets: usize,
        top_score: Option<f32>,
    },
    ConnectionRegistered {
        key: String,
        tenant_id: Option<String>,
        agent_id: Option<String>,
    },
    ConnectionDropped {
        key: String,
        reason: String,
    },
    WebhookDelivered {
        #[serde(rename = "webhook_event")]
        event: String,
        status: u16,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(parlor_event = %json, "parlor_event");
    }
}
