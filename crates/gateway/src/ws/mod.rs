//! WebSocket transports: the per-session chat socket and the
//! human-agent console socket.
//!
//! Both follow the same shape: register a frame sink with the
//! Connection Registry, spawn a writer task that serializes outbound
//! frames, and dispatch inbound frames to orchestrator calls in the
//! read loop. Disconnects are silent (log only) and never touch
//! session state.

mod chat;
mod human_agent;

pub use chat::chat_socket;
pub use human_agent::human_agent_socket;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

use parlor_protocol::ServerFrame;

/// Drain a frame channel into the socket's write half. Ends when the
/// channel closes or a write fails; either way the transport is done.
pub(crate) async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "outbound frame serialization failed");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}
