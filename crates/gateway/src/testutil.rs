//! Shared fixtures for gateway unit tests.

use std::sync::Arc;

use parlor_domain::config::Config;
use parlor_providers::ProviderRegistry;
use parlor_retrieval::NullRetriever;
use parlor_sessions::{SessionStore, TranscriptStore};
use tempfile::TempDir;

use crate::connections::ConnectionRegistry;
use crate::directory::StaticAgentDirectory;
use crate::notify::NoopNotifier;
use crate::runtime::turn_lock::TurnLockMap;
use crate::state::AppState;

/// A fully wired [`AppState`] over a temp dir: empty provider registry,
/// null retriever, no auth. The `TempDir` must outlive the state.
pub fn test_state() -> (AppState, TempDir) {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(Config::default());

    let state = AppState {
        llm: Arc::new(ProviderRegistry::default()),
        retriever: Arc::new(NullRetriever),
        directory: StaticAgentDirectory::from_config(&config),
        sessions: Arc::new(SessionStore::new(tmp.path()).unwrap()),
        transcripts: Arc::new(TranscriptStore::new(tmp.path()).unwrap()),
        turn_locks: Arc::new(TurnLockMap::new()),
        connections: Arc::new(ConnectionRegistry::new()),
        notifier: Arc::new(NoopNotifier),
        api_token_hash: None,
        human_agent_token: None,
        config,
    };
    (state, tmp)
}
