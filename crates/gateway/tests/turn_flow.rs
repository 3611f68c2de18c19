//! End-to-end turn flows through the orchestrator: AI generation,
//! human handoff routing, and terminal-event guarantees.

use std::sync::Arc;

use tokio::sync::mpsc;

use parlor_domain::chat::Role;
use parlor_domain::config::Config;
use parlor_domain::error::Result;
use parlor_domain::stream::{BoxStream, StreamEvent, Usage};
use parlor_protocol::ServerFrame;
use parlor_providers::{ChatProvider, GenerationRequest, ProviderRegistry};
use parlor_retrieval::NullRetriever;
use parlor_sessions::{SessionKind, SessionMode, SessionStore, TranscriptStore};

use parlor_gateway::connections::{ConnectionKey, ConnectionRegistry};
use parlor_gateway::directory::StaticAgentDirectory;
use parlor_gateway::notify::NoopNotifier;
use parlor_gateway::runtime::turn_lock::TurnLockMap;
use parlor_gateway::runtime::{handoff, submit_turn};
use parlor_gateway::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider that replays a fixed event script on every call.
struct ScriptedProvider {
    id: String,
    script: Vec<StreamEvent>,
}

#[async_trait::async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        _req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let events: Vec<Result<StreamEvent>> = self.script.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

fn scripted_registry(script: Vec<StreamEvent>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::default();
    registry.insert(
        "openai",
        Arc::new(ScriptedProvider {
            id: "openai".into(),
            script,
        }),
    );
    Arc::new(registry)
}

fn state_with(llm: Arc<ProviderRegistry>, tmp: &tempfile::TempDir) -> AppState {
    let config = Arc::new(Config::default());
    AppState {
        llm,
        retriever: Arc::new(NullRetriever),
        directory: StaticAgentDirectory::from_config(&config),
        sessions: Arc::new(SessionStore::new(tmp.path()).unwrap()),
        transcripts: Arc::new(TranscriptStore::new(tmp.path()).unwrap()),
        turn_locks: Arc::new(TurnLockMap::new()),
        connections: Arc::new(ConnectionRegistry::new()),
        notifier: Arc::new(NoopNotifier),
        api_token_hash: None,
        human_agent_token: None,
        config,
    }
}

async fn drain(mut handle: parlor_gateway::runtime::TurnHandle) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = handle.frames.recv().await {
        frames.push(frame);
    }
    frames
}

fn terminal_count(frames: &[ServerFrame]) -> usize {
    frames.iter().filter(|f| f.is_terminal()).count()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AI-mode turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ai_turn_streams_start_chunks_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let state = state_with(
        scripted_registry(vec![
            StreamEvent::Token { text: "Hel".into() },
            StreamEvent::Token { text: "lo!".into() },
            StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 12,
                    completion_tokens: 3,
                    total_tokens: 15,
                }),
                finish_reason: Some("stop".into()),
            },
        ]),
        &tmp,
    );

    let session = state
        .sessions
        .open("t1", "a1", None, SessionKind::StandaloneWidget);
    let handle = submit_turn(&state, &session.session_id, "hello", None)
        .await
        .unwrap();
    let frames = drain(handle).await;

    assert!(matches!(frames[0], ServerFrame::Start { .. }));
    assert!(!frames
        .iter()
        .any(|f| matches!(f, ServerFrame::Context { .. })));
    let chunks: Vec<&ServerFrame> = frames
        .iter()
        .filter(|f| matches!(f, ServerFrame::Chunk { .. }))
        .collect();
    assert_eq!(chunks.len(), 2);
    match frames.last().unwrap() {
        ServerFrame::End { full_response, .. } => assert_eq!(full_response, "Hello!"),
        other => panic!("expected end, got {other:?}"),
    }
    assert_eq!(terminal_count(&frames), 1);

    // Transcript: user then assistant, gapless sequence from 1.
    let transcript = state.transcripts.read(&session.session_id).unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[0].content, "hello");
    assert_eq!(transcript[0].sequence, 1);
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].content, "Hello!");
    assert_eq!(transcript[1].sequence, 2);
}

#[tokio::test]
async fn provider_stream_error_terminates_turn_only() {
    let tmp = tempfile::TempDir::new().unwrap();
    let state = state_with(
        scripted_registry(vec![
            StreamEvent::Token { text: "par".into() },
            StreamEvent::Error {
                message: "upstream closed".into(),
            },
        ]),
        &tmp,
    );

    let session = state
        .sessions
        .open("t1", "a1", None, SessionKind::StandaloneWidget);
    let frames = drain(
        submit_turn(&state, &session.session_id, "hi", None)
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    assert!(matches!(
        frames.last().unwrap(),
        ServerFrame::Error { .. }
    ));

    // The session survives and accepts the next turn.
    let session = state.sessions.require(&session.session_id).unwrap();
    assert!(session.is_active());
    let frames = drain(
        submit_turn(&state, &session.session_id, "again", None)
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(terminal_count(&frames), 1);
}

#[tokio::test]
async fn unknown_provider_turn_still_terminates() {
    let tmp = tempfile::TempDir::new().unwrap();
    // Empty registry: the default agent profile names "openai", which
    // falls back to the unsupported-provider diagnostic.
    let state = state_with(Arc::new(ProviderRegistry::default()), &tmp);

    let session = state
        .sessions
        .open("t1", "a1", None, SessionKind::StandaloneWidget);
    let frames = drain(
        submit_turn(&state, &session.session_id, "hi", None)
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    assert!(frames.iter().any(|f| matches!(
        f,
        ServerFrame::Chunk { content, .. } if content.contains("not supported")
    )));
    assert!(matches!(frames.last().unwrap(), ServerFrame::End { .. }));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handoff routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn handoff_routes_turns_to_the_console_and_back() {
    let tmp = tempfile::TempDir::new().unwrap();
    let state = state_with(
        scripted_registry(vec![
            StreamEvent::Token { text: "ai".into() },
            StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            },
        ]),
        &tmp,
    );

    let session = state
        .sessions
        .open("t1", "a1", None, SessionKind::StandaloneWidget);

    // Human agent console connects.
    let (console_tx, mut console) = mpsc::channel(16);
    state.connections.register(
        ConnectionKey::HumanAgent("h1".into()),
        None,
        None,
        console_tx,
    );

    let record = handoff::request_handoff(&state, &session.session_id, "billing", Some("high"))
        .await
        .unwrap();
    assert_eq!(record.priority.estimated_wait_minutes(), 2);
    assert_eq!(
        state.sessions.require(&session.session_id).unwrap().mode,
        SessionMode::HumanPending
    );
    assert!(matches!(
        console.recv().await.unwrap(),
        ServerFrame::HandoffRequested { .. }
    ));

    handoff::accept_handoff(&state, &record.handoff_id, "h1", Some("Dana"))
        .await
        .unwrap();
    assert_eq!(
        state.sessions.require(&session.session_id).unwrap().mode,
        SessionMode::HumanActive
    );

    // A user turn now relays to the console instead of generating.
    let frames = drain(
        submit_turn(&state, &session.session_id, "are you there?", None)
            .await
            .unwrap(),
    )
    .await;
    assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Start { .. })));
    assert!(
        matches!(frames.last().unwrap(), ServerFrame::End { full_response, .. } if full_response.is_empty())
    );
    assert!(matches!(
        console.recv().await.unwrap(),
        ServerFrame::Message { sender, session_id: Some(_), .. } if sender == "user"
    ));

    // Ending the handoff returns the session to generation.
    handoff::end_handoff(&state, &session.session_id, Some("resolved"))
        .await
        .unwrap();
    assert_eq!(
        state.sessions.require(&session.session_id).unwrap().mode,
        SessionMode::Ai
    );
    let frames = drain(
        submit_turn(&state, &session.session_id, "back to ai", None)
            .await
            .unwrap(),
    )
    .await;
    assert!(frames.iter().any(|f| matches!(f, ServerFrame::Start { .. })));
    assert!(matches!(frames.last().unwrap(), ServerFrame::End { .. }));
}

#[tokio::test]
async fn double_request_yields_one_record() {
    let tmp = tempfile::TempDir::new().unwrap();
    let state = state_with(Arc::new(ProviderRegistry::default()), &tmp);
    let session = state
        .sessions
        .open("t1", "a1", None, SessionKind::StandaloneWidget);

    let first = handoff::request_handoff(&state, &session.session_id, "one", Some("low"))
        .await
        .unwrap();
    let second = handoff::request_handoff(&state, &session.session_id, "two", Some("high"))
        .await
        .unwrap();
    assert_eq!(first.handoff_id, second.handoff_id);
    assert_eq!(state.sessions.pending_handoffs(Some("t1")).len(), 1);
}
