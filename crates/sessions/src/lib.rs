//! Durable conversation state: the session store (tenant/agent/handoff
//! record per conversation) and the append-only transcript store with
//! gapless per-session sequence numbers.

pub mod store;
pub mod transcript;

pub use store::{
    HandoffPriority, HandoffRecord, HandoffStatus, Participant, Session, SessionFilter,
    SessionKind, SessionMode, SessionStatus, SessionStore,
};
pub use transcript::{estimate_tokens, MessageRecord, TranscriptStore};
