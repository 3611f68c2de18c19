//! The per-session chat socket: `GET /ws/chat/:session_id`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use parlor_protocol::{ClientFrame, ServerFrame};
use parlor_sessions::{Session, SessionKind};

use crate::connections::ConnectionKey;
use crate::runtime::{handoff, submit_turn};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatSocketQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

pub async fn chat_socket(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<ChatSocketQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle(socket, state, session_id, query))
}

async fn handle(socket: WebSocket, state: AppState, session_id: String, query: ChatSocketQuery) {
    let (sink, mut reader) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerFrame>(64);
    let writer = tokio::spawn(super::write_frames(sink, rx));

    let session = match resolve_session(&state, &session_id, &query) {
        Some(s) => s,
        None => {
            let _ = tx
                .send(ServerFrame::Error {
                    error: format!("session {session_id} not found"),
                    message_id: None,
                })
                .await;
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    let key = ConnectionKey::Session(session.session_id.clone());
    state.connections.register(
        key.clone(),
        Some(session.tenant_id.clone()),
        Some(session.agent_id.clone()),
        tx.clone(),
    );

    let _ = tx
        .send(ServerFrame::Connected {
            session_id: Some(session.session_id.clone()),
            agent_id: Some(session.agent_id.clone()),
            timestamp: Utc::now(),
        })
        .await;

    while let Some(msg) = reader.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(session_id = %session.session_id, error = %e, "socket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        let _ = tx
                            .send(ServerFrame::Error {
                                error: format!("invalid frame: {e}"),
                                message_id: None,
                            })
                            .await;
                        continue;
                    }
                };
                state.connections.touch(&key);
                dispatch(&state, &session.session_id, frame, &tx).await;
            }
            Message::Close(_) => break,
            // Protocol-level ping/pong is handled by the stack.
            _ => {}
        }
    }

    state.connections.unregister(&key, "client disconnected");
    drop(tx);
    let _ = writer.await;
}

/// An existing active session wins; otherwise the query parameters may
/// open a fresh one (widget bootstrap), announced via `connected`.
fn resolve_session(state: &AppState, session_id: &str, query: &ChatSocketQuery) -> Option<Session> {
    if let Some(session) = state.sessions.get(session_id).filter(Session::is_active) {
        return Some(session);
    }
    match (&query.tenant_id, &query.agent_id) {
        (Some(tenant_id), Some(agent_id)) => Some(state.sessions.open(
            tenant_id,
            agent_id,
            None,
            SessionKind::StandaloneWidget,
        )),
        _ => None,
    }
}

async fn dispatch(
    state: &AppState,
    session_id: &str,
    frame: ClientFrame,
    tx: &mpsc::Sender<ServerFrame>,
) {
    match frame {
        ClientFrame::Message {
            content,
            agent_config,
        } => {
            let _ = tx
                .send(ServerFrame::MessageReceived {
                    timestamp: Utc::now(),
                })
                .await;
            match submit_turn(state, session_id, &content, agent_config).await {
                Ok(mut handle) => {
                    // Frames are relayed in emission order; the turn
                    // channel closes after its terminal frame.
                    while let Some(frame) = handle.frames.recv().await {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ServerFrame::Error {
                            error: e.to_string(),
                            message_id: None,
                        })
                        .await;
                }
            }
        }

        ClientFrame::Typing { is_typing } => {
            if let Some(agent_id) = state
                .sessions
                .get(session_id)
                .and_then(|s| s.accepted_agent_id().map(str::to_owned))
            {
                state
                    .connections
                    .send(
                        &ConnectionKey::HumanAgent(agent_id),
                        ServerFrame::UserTyping {
                            session_id: session_id.to_owned(),
                            is_typing,
                        },
                    )
                    .await;
            }
        }

        ClientFrame::Ping => {
            let _ = tx
                .send(ServerFrame::Pong {
                    timestamp: Utc::now(),
                })
                .await;
        }

        ClientFrame::HandoffRequest { reason, priority } => {
            match handoff::request_handoff(state, session_id, &reason, priority.as_deref()).await {
                Ok(record) => {
                    let _ = tx.send(handoff::initiated_frame(&record)).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(ServerFrame::Error {
                            error: e.to_string(),
                            message_id: None,
                        })
                        .await;
                }
            }
        }

        ClientFrame::HumanMessage { content, agent_id } => {
            if let Err(e) =
                handoff::send_human_message(state, session_id, &agent_id, &content).await
            {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: e.to_string(),
                        message_id: None,
                    })
                    .await;
            }
        }
    }
}
