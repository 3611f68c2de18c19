//! AppState construction and background-task spawning extracted from
//! `main.rs`, so CLI commands can boot the runtime without a listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use parlor_domain::config::Config;
use parlor_providers::ProviderRegistry;
use parlor_sessions::{SessionStore, TranscriptStore};

use crate::connections::ConnectionRegistry;
use crate::directory::StaticAgentDirectory;
use crate::runtime::turn_lock::TurnLockMap;
use crate::state::AppState;

/// Initialize every subsystem and return a fully wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── LLM providers ────────────────────────────────────────────────
    let llm = Arc::new(ProviderRegistry::from_config(&config.llm));
    if llm.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — turns will answer with a provider diagnostic"
        );
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    // ── Retrieval ────────────────────────────────────────────────────
    let retriever = parlor_retrieval::from_config(&config.retrieval)
        .context("initializing context retriever")?;

    // ── Agent directory ──────────────────────────────────────────────
    let directory = StaticAgentDirectory::from_config(&config);

    // ── Session state ────────────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.sessions.state_path).context("initializing session store")?,
    );
    let transcripts = Arc::new(
        TranscriptStore::new(&config.sessions.state_path)
            .context("initializing transcript store")?,
    );
    tracing::info!(
        state_path = %config.sessions.state_path.display(),
        history_window = config.sessions.history_window,
        "session stores ready"
    );

    // ── Outbound webhooks ────────────────────────────────────────────
    let notifier =
        crate::notify::from_config(&config.webhooks).context("initializing webhook notifier")?;

    // ── Tokens (resolved once at startup) ────────────────────────────
    let api_token_hash = read_env_token(&config.server.api_token_env)
        .map(|t| Sha256::digest(t.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!(
            env_var = %config.server.api_token_env,
            "management API token not set — /v1 routes are unauthenticated (dev mode)"
        );
    }

    let human_agent_token = read_env_token(&config.server.human_agent_token_env);
    if human_agent_token.is_none() {
        tracing::warn!(
            env_var = %config.server.human_agent_token_env,
            "human-agent token not set — console socket is open (dev mode)"
        );
    }

    Ok(AppState {
        config,
        llm,
        retriever,
        directory,
        sessions,
        transcripts,
        turn_locks: Arc::new(TurnLockMap::new()),
        connections: Arc::new(ConnectionRegistry::new()),
        notifier,
        api_token_hash,
        human_agent_token,
    })
}

/// Periodic maintenance: flush the session store and drop idle turn
/// locks. Runs until the process exits.
pub fn spawn_background_tasks(state: &AppState) {
    let state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;
            if let Err(e) = state.sessions.flush() {
                tracing::warn!(error = %e, "periodic session flush failed");
            }
            state.turn_locks.prune_idle();
        }
    });
}

fn read_env_token(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|t| !t.is_empty())
}
