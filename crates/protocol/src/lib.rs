//! Wire protocol: JSON frame types exchanged over the chat transports.
//!
//! Two inbound vocabularies (end-user session socket, human-agent
//! socket) and one shared outbound vocabulary. The push-stream transport
//! reuses the outbound frames as `data:` payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parlor_domain::agent::AgentProfile;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound: end-user session socket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Frames a connected end user may send on `/ws/chat/:session_id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// A user turn. `agent_config` optionally overrides the directory
    /// profile (playground flows configure the agent client-side).
    #[serde(rename = "message")]
    Message {
        content: String,
        #[serde(default)]
        agent_config: Option<AgentProfile>,
    },

    /// Typing indicator, relayed to the accepted human agent if any.
    #[serde(rename = "typing")]
    Typing { is_typing: bool },

    /// Application-level heartbeat.
    #[serde(rename = "ping")]
    Ping,

    /// Ask for a human agent.
    #[serde(rename = "handoff_request")]
    HandoffRequest {
        reason: String,
        #[serde(default)]
        priority: Option<String>,
    },

    /// A human-agent message relayed through the user's channel
    /// (shared-console deployments).
    #[serde(rename = "human_message")]
    HumanMessage { content: String, agent_id: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound: human-agent socket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Frames a human support agent may send on `/ws/human-agent/:agent_id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum HumanAgentFrame {
    #[serde(rename = "accept_handoff")]
    AcceptHandoff {
        handoff_id: String,
        #[serde(default)]
        agent_name: Option<String>,
    },

    #[serde(rename = "message")]
    Message { session_id: String, content: String },

    #[serde(rename = "end_handoff")]
    EndHandoff {
        session_id: String,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "typing")]
    Typing { session_id: String, is_typing: bool },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A ranked retrieval source reported alongside generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub source: String,
    pub score: f32,
}

/// Frames the server pushes to any connected transport.
///
/// Generation events (`start`, `context`, `chunk`, `end`, `error`) follow
/// the turn protocol: exactly one `start` per turn, then an optional
/// `context`, then chunks, then exactly one terminal `end` or `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "connected")]
    Connected {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "message_received")]
    MessageReceived { timestamp: DateTime<Utc> },

    #[serde(rename = "start")]
    Start {
        message_id: String,
        model: String,
        provider: String,
    },

    #[serde(rename = "context")]
    Context {
        message_id: String,
        sources: Vec<SourceEntry>,
    },

    #[serde(rename = "chunk")]
    Chunk { message_id: String, content: String },

    #[serde(rename = "end")]
    End {
        message_id: String,
        full_response: String,
        sources: Vec<String>,
    },

    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },

    /// Handoff acknowledged; the user is waiting for a human agent.
    #[serde(rename = "handoff_initiated")]
    HandoffInitiated {
        handoff_id: String,
        message: String,
        estimated_wait_minutes: u32,
    },

    /// Conversation returned to the AI.
    #[serde(rename = "handoff_ended")]
    HandoffEnded { message: String, reason: String },

    /// Pushed to connected human agents when a handoff is requested.
    #[serde(rename = "handoff_requested")]
    HandoffRequested {
        handoff_id: String,
        session_id: String,
        reason: String,
        priority: String,
    },

    /// Human agent is typing (sent to the user).
    #[serde(rename = "agent_typing")]
    AgentTyping { is_typing: bool },

    /// End user is typing (sent to the accepted human agent).
    #[serde(rename = "user_typing")]
    UserTyping { session_id: String, is_typing: bool },

    /// A relayed chat message: human-agent text delivered to the user,
    /// or user text forwarded to the accepted human agent's console
    /// (which needs the session id to route it).
    #[serde(rename = "message")]
    Message {
        content: String,
        sender: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    /// Whether this frame terminates a turn stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerFrame::End { .. } | ServerFrame::Error { .. })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_frame_parses() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"message","content":"hello"}"#).unwrap();
        match frame {
            ClientFrame::Message {
                content,
                agent_config,
            } => {
                assert_eq!(content, "hello");
                assert!(agent_config.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn handoff_request_defaults_priority_to_none() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"handoff_request","reason":"billing"}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::HandoffRequest { priority: None, .. }
        ));
    }

    #[test]
    fn server_frame_tags_match_wire_vocabulary() {
        let frame = ServerFrame::Chunk {
            message_id: "m1".into(),
            content: "hi".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "chunk");
        assert!(!frame.is_terminal());

        let end = ServerFrame::End {
            message_id: "m1".into(),
            full_response: "hi".into(),
            sources: vec![],
        };
        assert!(end.is_terminal());
    }

    #[test]
    fn unknown_inbound_type_is_rejected() {
        let res = serde_json::from_str::<ClientFrame>(r#"{"type":"bogus"}"#);
        assert!(res.is_err());
    }
}
