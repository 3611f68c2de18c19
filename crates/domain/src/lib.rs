//! Shared types used across all Parlor crates: errors, configuration,
//! trace events, chat/stream primitives, and agent profiles.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
