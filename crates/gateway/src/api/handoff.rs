//! Handoff management endpoints, used by support consoles that drive
//! the lifecycle over HTTP instead of the console socket.
//!
//! - `POST /v1/handoff/request` — request a human takeover
//! - `POST /v1/handoff/accept`  — claim a pending handoff
//! - `POST /v1/handoff/message` — deliver a human-agent message
//! - `POST /v1/handoff/end`     — return the session to the AI
//! - `GET  /v1/handoff/pending` — pending queue, highest priority first
//! - `GET  /v1/handoff/stats`   — counts by status

use axum::extract::{Json, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::runtime::handoff;
use crate::state::AppState;

use super::domain_error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RequestHandoffBody {
    pub session_id: String,
    pub reason: String,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptHandoffBody {
    pub handoff_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HumanMessageBody {
    pub session_id: String,
    pub agent_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct EndHandoffBody {
    pub session_id: String,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn request(
    State(state): State<AppState>,
    Json(body): Json<RequestHandoffBody>,
) -> Response {
    match handoff::request_handoff(
        &state,
        &body.session_id,
        &body.reason,
        body.priority.as_deref(),
    )
    .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn accept(
    State(state): State<AppState>,
    Json(body): Json<AcceptHandoffBody>,
) -> Response {
    match handoff::accept_handoff(
        &state,
        &body.handoff_id,
        &body.agent_id,
        body.agent_name.as_deref(),
    )
    .await
    {
        Ok(session) => Json(session).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn message(
    State(state): State<AppState>,
    Json(body): Json<HumanMessageBody>,
) -> Response {
    match handoff::send_human_message(&state, &body.session_id, &body.agent_id, &body.content)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "delivered": true })).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn end(State(state): State<AppState>, Json(body): Json<EndHandoffBody>) -> Response {
    match handoff::end_handoff(&state, &body.session_id, body.resolution.as_deref()).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn pending(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    let pending = state.sessions.pending_handoffs(query.tenant_id.as_deref());
    Json(serde_json::json!({
        "count": pending.len(),
        "pending": pending,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    Json(state.sessions.handoff_stats(query.tenant_id.as_deref()))
}
