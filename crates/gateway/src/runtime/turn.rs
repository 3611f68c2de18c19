//! Turn submission — the single entry point both transports use to run
//! a user message through the engine.
//!
//! `submit_turn` resolves the agent profile, persists the user message,
//! then dispatches on session mode: AI mode spawns the generation
//! pipeline; human mode relays the message to the accepted agent's
//! console. Either way the caller gets a frame receiver that ends with
//! exactly one terminal frame.

use tokio::sync::mpsc;

use parlor_domain::agent::AgentProfile;
use parlor_domain::chat::Role;
use parlor_domain::error::{Error, Result};
use parlor_protocol::ServerFrame;
use parlor_sessions::{estimate_tokens, Session, SessionMode};

use crate::connections::ConnectionKey;
use crate::runtime::pipeline::{self, GenerationInput};
use crate::state::AppState;

/// Frames for one in-flight turn, drained by the submitting transport.
#[derive(Debug)]
pub struct TurnHandle {
    pub message_id: String,
    pub frames: mpsc::Receiver<ServerFrame>,
}

/// Run one user turn against a session.
///
/// `agent_override` takes precedence over the directory profile
/// (playground flows configure the agent client-side). Rejects the turn
/// if the session has ended or another turn is already in flight.
pub async fn submit_turn(
    state: &AppState,
    session_id: &str,
    user_message: &str,
    agent_override: Option<AgentProfile>,
) -> Result<TurnHandle> {
    let session = state.sessions.require(session_id)?;
    if !session.is_active() {
        return Err(Error::InvalidState("session has ended".into()));
    }

    // Profile resolution may await; it only depends on the agent id,
    // which never changes for a session.
    let profile = resolve_profile(state, &session, agent_override).await?;

    // Single flight per session: the permit travels with the turn and
    // releases when it finishes.
    let permit = state
        .turn_locks
        .try_acquire(session_id)
        .map_err(|e| Error::InvalidState(e.to_string()))?;

    // Re-read under the permit: a handoff accepted while this call was
    // resolving must route this turn to the console, not the pipeline.
    let session = state.sessions.require(session_id)?;
    if !session.is_active() {
        return Err(Error::InvalidState("session has ended".into()));
    }

    // The user message lands in the transcript before anything is
    // generated or relayed, whatever happens downstream.
    let token_count = estimate_tokens(user_message);
    state
        .transcripts
        .append(session_id, Role::User, user_message, token_count, None)?;
    state.sessions.record_message(session_id, token_count);

    let message_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(64);

    match session.mode {
        SessionMode::Ai => {
            let input = GenerationInput {
                session,
                profile,
                user_message: user_message.to_owned(),
                message_id: message_id.clone(),
            };
            let state = state.clone();
            tokio::spawn(async move {
                pipeline::run_generation(state, input, tx).await;
                drop(permit);
            });
        }
        SessionMode::HumanPending | SessionMode::HumanActive => {
            relay_to_human_agent(state, &session, user_message).await;
            // No generation happens; terminate the turn immediately so
            // transports see a complete frame sequence.
            let _ = tx
                .send(ServerFrame::End {
                    message_id: message_id.clone(),
                    full_response: String::new(),
                    sources: Vec::new(),
                })
                .await;
            drop(permit);
        }
    }

    Ok(TurnHandle {
        message_id,
        frames: rx,
    })
}

/// Resolve the profile driving this turn: explicit override, then the
/// directory, then engine defaults for unknown agents.
async fn resolve_profile(
    state: &AppState,
    session: &Session,
    agent_override: Option<AgentProfile>,
) -> Result<AgentProfile> {
    if let Some(profile) = agent_override {
        return Ok(profile);
    }
    if let Some(profile) = state.directory.get_profile(&session.agent_id).await? {
        return Ok(profile);
    }
    Ok(AgentProfile {
        agent_id: session.agent_id.clone(),
        name: None,
        settings: Default::default(),
        knowledge_base_ids: Vec::new(),
        intents: Vec::new(),
    })
}

/// Forward a user message to the console of the agent handling the
/// session. Best-effort; the message is already persisted.
async fn relay_to_human_agent(state: &AppState, session: &Session, content: &str) {
    let Some(agent_id) = session.accepted_agent_id() else {
        return;
    };
    state
        .connections
        .send(
            &ConnectionKey::HumanAgent(agent_id.to_owned()),
            ServerFrame::Message {
                content: content.to_owned(),
                sender: "user".into(),
                session_id: Some(session.session_id.clone()),
                timestamp: chrono::Utc::now(),
            },
        )
        .await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;
    use parlor_domain::agent::AgentDirectory;
    use parlor_sessions::{HandoffPriority, SessionKind, SessionStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn turn_on_unknown_session_is_not_found() {
        let (state, _tmp) = test_state();
        let err = submit_turn(&state, "nope", "hi", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn turn_on_ended_session_is_rejected() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);
        state.sessions.end(&session.session_id).unwrap();

        let err = submit_turn(&state, &session.session_id, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn human_mode_turn_terminates_without_generation() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);
        state
            .sessions
            .request_handoff(&session.session_id, "help", HandoffPriority::Normal)
            .unwrap();

        let mut handle = submit_turn(&state, &session.session_id, "are you there", None)
            .await
            .unwrap();

        let frame = handle.frames.recv().await.unwrap();
        assert!(matches!(frame, ServerFrame::End { ref full_response, .. } if full_response.is_empty()));
        assert!(handle.frames.recv().await.is_none());

        // The user message is still persisted.
        assert_eq!(state.transcripts.count(&session.session_id).unwrap(), 1);
    }

    /// Directory that requests and accepts a handoff while the profile
    /// is being resolved, flipping the session to human mid-submission.
    struct HandoffDuringResolve {
        sessions: Arc<SessionStore>,
        session_id: String,
    }

    #[async_trait::async_trait]
    impl AgentDirectory for HandoffDuringResolve {
        async fn get_profile(&self, _agent_id: &str) -> Result<Option<AgentProfile>> {
            let (record, _) =
                self.sessions
                    .request_handoff(&self.session_id, "urgent", HandoffPriority::High)?;
            self.sessions.accept_handoff(&record.handoff_id, "h1", None)?;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn handoff_accepted_mid_submission_skips_generation() {
        let (mut state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);
        state.directory = Arc::new(HandoffDuringResolve {
            sessions: state.sessions.clone(),
            session_id: session.session_id.clone(),
        });

        let mut handle = submit_turn(&state, &session.session_id, "hello?", None)
            .await
            .unwrap();

        // The turn must relay, not generate: no start frame, one empty
        // terminal end.
        let frame = handle.frames.recv().await.unwrap();
        assert!(matches!(frame, ServerFrame::End { ref full_response, .. } if full_response.is_empty()));
        assert!(handle.frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_concurrent_turn_is_rejected() {
        let (state, _tmp) = test_state();
        let session = state
            .sessions
            .open("t1", "a1", None, SessionKind::StandaloneWidget);

        let _held = state.turn_locks.try_acquire(&session.session_id).unwrap();
        let err = submit_turn(&state, &session.session_id, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
