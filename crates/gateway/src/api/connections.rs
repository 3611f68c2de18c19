//! Connection registry introspection.
//!
//! - `GET /v1/connections`          — live transport counts
//! - `GET /v1/connections/sessions` — connected sessions, newest first

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.connections.stats();
    Json(serde_json::json!({
        "connections": stats,
        "sessions_with_turn_lock": state.turn_locks.session_count(),
    }))
}

pub async fn sessions(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    let sessions = state.connections.active_sessions(query.tenant_id.as_deref());
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}
