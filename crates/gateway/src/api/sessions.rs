//! Session management endpoints.
//!
//! - `POST   /v1/sessions`              — open a session
//! - `GET    /v1/sessions`              — list with filters + pagination
//! - `GET    /v1/sessions/:id`          — session detail
//! - `GET    /v1/sessions/:id/messages` — transcript page
//! - `POST   /v1/sessions/:id/end`      — end a session
//! - `DELETE /v1/sessions/:id`          — destroy (playground only)
//! - `DELETE /v1/sessions/:id/messages` — wipe the transcript, keep the session

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use parlor_domain::trace::TraceEvent;
use parlor_sessions::{Participant, SessionFilter, SessionKind};

use crate::connections::ConnectionKey;
use crate::state::AppState;

use super::domain_error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub tenant_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub participant: Option<Participant>,
    #[serde(default)]
    pub kind: Option<SessionKind>,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub kind: Option<SessionKind>,
    #[serde(default)]
    pub include_ended: bool,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub page: usize,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "d_message_limit")]
    pub limit: usize,
}

fn d_message_limit() -> usize {
    100
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn open_session(
    State(state): State<AppState>,
    Json(body): Json<OpenSessionRequest>,
) -> impl IntoResponse {
    let session = state.sessions.open(
        &body.tenant_id,
        &body.agent_id,
        body.participant,
        body.kind.unwrap_or(SessionKind::StandaloneWidget),
    );
    (StatusCode::CREATED, Json(session))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> impl IntoResponse {
    let filter = SessionFilter {
        tenant_id: query.tenant_id,
        kind: query.kind,
        include_ended: query.include_ended,
        limit: query.limit,
        page: query.page,
    };
    let (sessions, total) = state.sessions.list(&filter);
    Json(serde_json::json!({
        "sessions": sessions,
        "total": total,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.require(&session_id) {
        Ok(session) => Json(session).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    if let Err(e) = state.sessions.require(&session_id) {
        return domain_error(e);
    }
    match state
        .transcripts
        .read_page(&session_id, query.offset, query.limit)
    {
        Ok(messages) => Json(serde_json::json!({
            "session_id": session_id,
            "offset": query.offset,
            "messages": messages,
        }))
        .into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.end(&session_id) {
        Ok(session) => {
            state
                .connections
                .unregister(&ConnectionKey::Session(session_id), "session ended");
            Json(session).into_response()
        }
        Err(e) => domain_error(e),
    }
}

/// Destroy a playground session and its transcript entirely.
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session = match state.sessions.clear(&session_id) {
        Ok(s) => s,
        Err(e) => return domain_error(e),
    };

    let messages_deleted = state.transcripts.clear(&session_id).unwrap_or_else(|e| {
        tracing::warn!(session_id = %session_id, error = %e, "transcript wipe failed");
        0
    });
    state
        .connections
        .unregister(&ConnectionKey::Session(session_id.clone()), "session cleared");

    TraceEvent::SessionCleared {
        session_id,
        messages_deleted,
    }
    .emit();

    Json(serde_json::json!({
        "session_id": session.session_id,
        "messages_deleted": messages_deleted,
    }))
    .into_response()
}

/// Wipe the transcript but keep the session (any kind).
pub async fn clear_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Err(e) = state.sessions.require(&session_id) {
        return domain_error(e);
    }

    match state.transcripts.clear(&session_id) {
        Ok(messages_deleted) => {
            state.sessions.reset_message_count(&session_id);
            TraceEvent::SessionCleared {
                session_id: session_id.clone(),
                messages_deleted,
            }
            .emit();
            Json(serde_json::json!({
                "session_id": session_id,
                "messages_deleted": messages_deleted,
            }))
            .into_response()
        }
        Err(e) => domain_error(e),
    }
}
