use std::sync::Arc;

use parlor_domain::agent::AgentDirectory;
use parlor_domain::config::Config;
use parlor_providers::ProviderRegistry;
use parlor_retrieval::ContextRetriever;
use parlor_sessions::{SessionStore, TranscriptStore};

use crate::connections::ConnectionRegistry;
use crate::notify::Notifier;
use crate::runtime::turn_lock::TurnLockMap;

/// Shared application state passed to all handlers.
///
/// Everything is injected here at bootstrap; no component reaches for
/// globals. Fields are grouped by concern:
/// - **Core services** — config, provider registry, retriever, directory
/// - **Session state** — session store, transcripts, per-session locks
/// - **Live transports** — connection registry
/// - **Outbound** — webhook notifier
/// - **Security** — startup-computed token hashes
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub retriever: Arc<dyn ContextRetriever>,
    pub directory: Arc<dyn AgentDirectory>,

    // ── Session state ─────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub transcripts: Arc<TranscriptStore>,
    pub turn_locks: Arc<TurnLockMap>,

    // ── Live transports ───────────────────────────────────────────
    pub connections: Arc<ConnectionRegistry>,

    // ── Outbound ──────────────────────────────────────────────────
    pub notifier: Arc<dyn Notifier>,

    // ── Security (startup-computed) ───────────────────────────────
    /// SHA-256 hash of the management API bearer token.
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    /// Token human-agent sockets must present. `None` = open access.
    pub human_agent_token: Option<String>,
}
