//! The human-agent console socket: `GET /ws/human-agent/:agent_id`.
//!
//! Authenticated by a shared token passed as a query parameter (browser
//! WebSocket clients cannot set headers). On connect the console gets
//! the current pending-handoff queue so nothing requested while it was
//! offline is lost.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use parlor_protocol::{HumanAgentFrame, ServerFrame};

use crate::api::auth::token_eq;
use crate::connections::ConnectionKey;
use crate::runtime::handoff;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HumanAgentSocketQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn human_agent_socket(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<String>,
    Query(query): Query<HumanAgentSocketQuery>,
    State(state): State<AppState>,
) -> Response {
    if let Some(expected) = &state.human_agent_token {
        let presented = query.token.as_deref().unwrap_or("");
        if !token_eq(presented, expected) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    ws.on_upgrade(move |socket| handle(socket, state, agent_id))
}

async fn handle(socket: WebSocket, state: AppState, agent_id: String) {
    let (sink, mut reader) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerFrame>(64);
    let writer = tokio::spawn(super::write_frames(sink, rx));

    let key = ConnectionKey::HumanAgent(agent_id.clone());
    state.connections.register(key.clone(), None, None, tx.clone());

    let _ = tx
        .send(ServerFrame::Connected {
            session_id: None,
            agent_id: Some(agent_id.clone()),
            timestamp: Utc::now(),
        })
        .await;

    // Replay the pending queue so a freshly connected console sees
    // requests made while nobody was listening.
    for record in state.sessions.pending_handoffs(None) {
        let _ = tx
            .send(ServerFrame::HandoffRequested {
                handoff_id: record.handoff_id.clone(),
                session_id: record.session_id.clone(),
                reason: record.reason.clone(),
                priority: record.priority.as_str().to_owned(),
            })
            .await;
    }

    while let Some(msg) = reader.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(agent_id = %agent_id, error = %e, "console read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<HumanAgentFrame>(&text) {
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
                dispatch(&state, &agent_id, frame, &tx).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.connections.unregister(&key, "console disconnected");
    drop(tx);
    let _ = writer.await;
}

async fn dispatch(
    state: &AppState,
    agent_id: &str,
    frame: HumanAgentFrame,
    tx: &mpsc::Sender<ServerFrame>,
) {
    match frame {
        HumanAgentFrame::AcceptHandoff {
            handoff_id,
            agent_name,
        } => match handoff::accept_handoff(state, &handoff_id, agent_id, agent_name.as_deref())
            .await
        {
            Ok(session) => {
                let _ = tx
                    .send(ServerFrame::Message {
                        content: format!("Handoff {handoff_id} accepted."),
                        sender: "system".into(),
                        session_id: Some(session.session_id),
                        timestamp: Utc::now(),
                    })
                    .await;
            }
            Err(e) => {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: e.to_string(),
                        message_id: None,
                    })
                    .await;
            }
        },

        HumanAgentFrame::Message {
            session_id,
            content,
        } => {
            if let Err(e) =
                handoff::send_human_message(state, &session_id, agent_id, &content).await
            {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: e.to_string(),
                        message_id: None,
                    })
                    .await;
            }
        }

        HumanAgentFrame::EndHandoff { session_id, reason } => {
            if let Err(e) = handoff::end_handoff(state, &session_id, reason.as_deref()).await {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: e.to_string(),
                        message_id: None,
                    })
                    .await;
            }
        }

        HumanAgentFrame::Typing {
            session_id,
            is_typing,
        } => {
            state
                .connections
                .send(
                    &ConnectionKey::Session(session_id),
                    ServerFrame::AgentTyping { is_typing },
                )
                .await;
        }
    }
}
