pub mod auth;
pub mod chat;
pub mod connections;
pub mod handoff;
pub mod sessions;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use parlor_domain::error::Error;

use crate::state::AppState;

/// Build the full router: client-facing transports are public, the
/// management API sits behind the bearer-token middleware.
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health))
        // Client transports: the widget authenticates at the edge, not
        // with the management token.
        .route(
            "/v1/tenants/:tenant_id/agents/:agent_id/chat/stream",
            post(chat::chat_stream),
        )
        .route("/ws/chat/:session_id", get(crate::ws::chat_socket))
        .route(
            "/ws/human-agent/:agent_id",
            get(crate::ws::human_agent_socket),
        );

    let protected = Router::new()
        // Sessions
        .route("/v1/sessions", post(sessions::open_session))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:id", get(sessions::get_session))
        .route("/v1/sessions/:id/messages", get(sessions::get_messages))
        .route("/v1/sessions/:id/end", post(sessions::end_session))
        .route("/v1/sessions/:id", delete(sessions::clear_session))
        .route(
            "/v1/sessions/:id/messages",
            delete(sessions::clear_messages),
        )
        // Handoff
        .route("/v1/handoff/request", post(handoff::request))
        .route("/v1/handoff/accept", post(handoff::accept))
        .route("/v1/handoff/message", post(handoff::message))
        .route("/v1/handoff/end", post(handoff::end))
        .route("/v1/handoff/pending", get(handoff::pending))
        .route("/v1/handoff/stats", get(handoff::stats))
        // Connection registry
        .route("/v1/connections", get(connections::stats))
        .route("/v1/connections/sessions", get(connections::sessions))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a domain error to its HTTP status.
pub(crate) fn domain_error(err: Error) -> Response {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}
