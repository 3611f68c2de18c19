//! Handoff orchestration on top of the session store's state machine.
//!
//! The store owns the legal transitions; this layer adds the side
//! effects around them: notifying connected human-agent consoles,
//! pushing status frames to the end user, persisting human messages,
//! and firing outbound webhooks. All delivery is best-effort — state
//! transitions never roll back because a socket was closed.

use chrono::Utc;
use serde_json::json;

use parlor_domain::chat::Role;
use parlor_domain::error::{Error, Result};
use parlor_protocol::ServerFrame;
use parlor_sessions::{estimate_tokens, HandoffPriority, HandoffRecord, Session, SessionMode};

use crate::connections::ConnectionKey;
use crate::notify::NotifyEvent;
use crate::state::AppState;

/// Request a human takeover for a session.
///
/// Re-requesting while a handoff is open returns the existing record
/// without re-notifying anyone. Connected human-agent consoles and the
/// webhook endpoint are told only about newly created requests.
pub async fn request_handoff(
    state: &AppState,
    session_id: &str,
    reason: &str,
    priority: Option<&str>,
) -> Result<HandoffRecord> {
    let session = state.sessions.require(session_id)?;
    let priority = priority
        .map(HandoffPriority::parse)
        .unwrap_or(HandoffPriority::Normal);

    let (record, created) = state.sessions.request_handoff(session_id, reason, priority)?;
    if !created {
        return Ok(record);
    }

    state
        .connections
        .notify_human_agents(&ServerFrame::HandoffRequested {
            handoff_id: record.handoff_id.clone(),
            session_id: session_id.to_owned(),
            reason: record.reason.clone(),
            priority: record.priority.as_str().to_owned(),
        })
        .await;

    state
        .notifier
        .notify(NotifyEvent::HandoffRequested {
            tenant_id: session.tenant_id,
            session_id: session_id.to_owned(),
            handoff_id: record.handoff_id.clone(),
            reason: record.reason.clone(),
            priority: record.priority.as_str().to_owned(),
        })
        .await;

    Ok(record)
}

/// The acknowledgement frame shown to the requesting user.
pub fn initiated_frame(record: &HandoffRecord) -> ServerFrame {
    let wait = record.priority.estimated_wait_minutes();
    ServerFrame::HandoffInitiated {
        handoff_id: record.handoff_id.clone(),
        message: format!(
            "A human agent has been notified and will join shortly. \
             Estimated wait: {wait} minutes."
        ),
        estimated_wait_minutes: wait,
    }
}

/// A human agent claims a pending handoff.
///
/// The user is told who joined; the session switches to human-active
/// mode so subsequent user turns relay instead of generating.
pub async fn accept_handoff(
    state: &AppState,
    handoff_id: &str,
    agent_id: &str,
    agent_name: Option<&str>,
) -> Result<Session> {
    let session = state
        .sessions
        .accept_handoff(handoff_id, agent_id, agent_name)?;

    let display_name = agent_name.unwrap_or(agent_id);
    state
        .connections
        .send(
            &ConnectionKey::Session(session.session_id.clone()),
            ServerFrame::Message {
                content: format!("You are now connected with {display_name}."),
                sender: "system".into(),
                session_id: None,
                timestamp: Utc::now(),
            },
        )
        .await;

    state
        .notifier
        .notify(NotifyEvent::HandoffAccepted {
            tenant_id: session.tenant_id.clone(),
            session_id: session.session_id.clone(),
            handoff_id: handoff_id.to_owned(),
            human_agent_id: agent_id.to_owned(),
        })
        .await;

    Ok(session)
}

/// Deliver a human agent's message to the user and the transcript.
///
/// Only the agent who accepted the handoff may speak in the session.
pub async fn send_human_message(
    state: &AppState,
    session_id: &str,
    human_agent_id: &str,
    content: &str,
) -> Result<()> {
    let session = state.sessions.require(session_id)?;
    if session.mode != SessionMode::HumanActive {
        return Err(Error::InvalidState(
            "session is not in an active handoff".into(),
        ));
    }
    if session.accepted_agent_id() != Some(human_agent_id) {
        return Err(Error::InvalidState(
            "handoff is assigned to a different agent".into(),
        ));
    }

    let token_count = estimate_tokens(content);
    state.transcripts.append(
        session_id,
        Role::HumanAgent,
        content,
        token_count,
        Some(json!({ "human_agent_id": human_agent_id })),
    )?;
    state.sessions.record_message(session_id, token_count);

    state
        .connections
        .send(
            &ConnectionKey::Session(session_id.to_owned()),
            ServerFrame::Message {
                content: content.to_owned(),
                sender: "human_agent".into(),
                session_id: None,
                timestamp: Utc::now(),
            },
        )
        .await;

    Ok(())
}

/// Close a handoff and return the session to the AI.
pub async fn end_handoff(
    state: &AppState,
    session_id: &str,
    resolution: Option<&str>,
) -> Result<Session> {
    let resolution = resolution.unwrap_or("resolved");
    let session = state.sessions.end_handoff(session_id, resolution)?;

    state
        .connections
        .send(
            &ConnectionKey::Session(session_id.to_owned()),
            ServerFrame::HandoffEnded {
                message: "You are now back with the AI assistant.".into(),
                reason: resolution.to_owned(),
            },
        )
        .await;

    if let Some(handoff) = &session.handoff {
        state
            .notifier
            .notify(NotifyEvent::HandoffEnded {
                tenant_id: session.tenant_id.clone(),
                session_id: session.session_id.clone(),
                handoff_id: handoff.handoff_id.clone(),
                resolution: resolution.to_owned(),
            })
            .await;
    }

    Ok(session)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;
    use parlor_sessions::{HandoffStatus, SessionKind};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn lifecycle_request_accept_message_end() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);

        // A connected human-agent console hears about the request.
        let (tx, mut console) = mpsc::channel(8);
        state
            .connections
            .register(ConnectionKey::HumanAgent("h1".into()), None, None, tx);

        let record = request_handoff(&state, &session.session_id, "billing", Some("high"))
            .await
            .unwrap();
        assert_eq!(record.priority, HandoffPriority::High);
        assert!(matches!(
            console.recv().await.unwrap(),
            ServerFrame::HandoffRequested { .. }
        ));

        let accepted = accept_handoff(&state, &record.handoff_id, "h1", Some("Dana"))
            .await
            .unwrap();
        assert_eq!(accepted.mode, SessionMode::HumanActive);

        send_human_message(&state, &session.session_id, "h1", "hi, Dana here")
            .await
            .unwrap();
        let transcript = state.transcripts.read(&session.session_id).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::HumanAgent);

        let ended = end_handoff(&state, &session.session_id, None).await.unwrap();
        assert_eq!(ended.mode, SessionMode::Ai);
        assert_eq!(
            ended.handoff.as_ref().unwrap().status,
            HandoffStatus::Completed
        );
    }

    #[tokio::test]
    async fn re_request_does_not_renotify() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);

        let first = request_handoff(&state, &session.session_id, "help", None)
            .await
            .unwrap();

        let (tx, mut console) = mpsc::channel(8);
        state
            .connections
            .register(ConnectionKey::HumanAgent("h1".into()), None, None, tx);

        let second = request_handoff(&state, &session.session_id, "help again", None)
            .await
            .unwrap();
        assert_eq!(first.handoff_id, second.handoff_id);
        assert!(console.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_the_accepted_agent_may_speak() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);

        let record = request_handoff(&state, &session.session_id, "help", None)
            .await
            .unwrap();

        // Pending handoff: nobody may speak yet.
        let err = send_human_message(&state, &session.session_id, "h1", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        accept_handoff(&state, &record.handoff_id, "h1", None)
            .await
            .unwrap();

        let err = send_human_message(&state, &session.session_id, "h2", "let me in")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(send_human_message(&state, &session.session_id, "h1", "hello")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn initiated_frame_carries_priority_wait() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);

        let record = request_handoff(&state, &session.session_id, "urgent", Some("high"))
            .await
            .unwrap();
        match initiated_frame(&record) {
            ServerFrame::HandoffInitiated {
                estimated_wait_minutes,
                ..
            } => assert_eq!(estimated_wait_minutes, 2),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
