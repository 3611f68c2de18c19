//! The push-stream transport: one POST per turn, answered with a
//! stream of `data: <json>\n\n` frames that mirrors the socket's
//! outbound vocabulary and closes after the terminal event.
//!
//! `POST /v1/tenants/:tenant_id/agents/:agent_id/chat/stream`

use axum::extract::{Json, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::Stream;
use serde::Deserialize;

use parlor_domain::agent::AgentProfile;
use parlor_domain::error::Error;
use parlor_protocol::ServerFrame;
use parlor_sessions::{Participant, Session, SessionKind};

use crate::runtime::{submit_turn, TurnHandle};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    /// User message text.
    pub message: String,
    /// Continue an existing session; absent means open a fresh one.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub participant: Option<Participant>,
    /// Session kind when opening (default standalone-widget).
    #[serde(default)]
    pub kind: Option<SessionKind>,
    /// Client-side agent override (playground flows).
    #[serde(default)]
    pub agent_config: Option<AgentProfile>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tenants/:tenant_id/agents/:agent_id/chat/stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    Path((tenant_id, agent_id)): Path<(String, String)>,
    Json(body): Json<ChatStreamRequest>,
) -> impl IntoResponse {
    let session = match resolve_session(&state, &tenant_id, &agent_id, &body) {
        Ok(s) => s,
        Err(e) => return error_stream(e.to_string()).into_response(),
    };

    let handle = match submit_turn(&state, &session.session_id, &body.message, body.agent_config)
        .await
    {
        Ok(h) => h,
        Err(e) => return error_stream(e.to_string()).into_response(),
    };

    Sse::new(frame_stream(session, handle))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn resolve_session(
    state: &AppState,
    tenant_id: &str,
    agent_id: &str,
    body: &ChatStreamRequest,
) -> Result<Session, Error> {
    if let Some(session_id) = &body.session_id {
        let session = state.sessions.require(session_id)?;
        // A session id from another tenant is indistinguishable from a
        // missing one.
        if session.tenant_id != tenant_id || session.agent_id != agent_id {
            return Err(Error::NotFound(format!("session {session_id}")));
        }
        return Ok(session);
    }
    Ok(state.sessions.open(
        tenant_id,
        agent_id,
        body.participant.clone(),
        body.kind.unwrap_or(SessionKind::StandaloneWidget),
    ))
}

/// The happy-path stream: a `connected` frame naming the session, then
/// the turn's frames in emission order until the terminal one.
fn frame_stream(
    session: Session,
    mut handle: TurnHandle,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let connected = ServerFrame::Connected {
            session_id: Some(session.session_id.clone()),
            agent_id: Some(session.agent_id.clone()),
            timestamp: Utc::now(),
        };
        yield Ok(frame_event(&connected));

        while let Some(frame) = handle.frames.recv().await {
            let terminal = frame.is_terminal();
            yield Ok(frame_event(&frame));
            if terminal {
                break;
            }
        }
    }
}

/// A turn that could not start still answers with a terminal frame.
fn error_stream(
    message: String,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = futures_util::stream::once(async move {
        Ok(frame_event(&ServerFrame::Error {
            error: message,
            message_id: None,
        }))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn frame_event(frame: &ServerFrame) -> Event {
    Event::default().data(serde_json::to_string(frame).unwrap_or_default())
}
