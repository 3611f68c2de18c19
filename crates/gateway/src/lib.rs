//! Parlor gateway: the conversational session engine.
//!
//! Hosts the Connection Registry, the session orchestrator (turn loop,
//! handoff state machine, generation pipeline) and the two client
//! transports (HTTP push stream and WebSocket), plus the management API.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod connections;
pub mod directory;
pub mod notify;
pub mod runtime;
pub mod state;
pub mod ws;

#[cfg(test)]
pub(crate) mod testutil;
