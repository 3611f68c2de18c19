//! The streaming generation pipeline for AI-mode turns.
//!
//! One turn flows through: context retrieval (when the agent has
//! knowledge bases), system prompt assembly, history windowing,
//! provider dispatch, and event emission. The emitted frame sequence is
//! always `start` → optional `context` → `chunk`×N → `end`, or `error`
//! as the terminal frame — exactly one terminal per turn, enforced here.
//!
//! Delivery is decoupled from generation: if the receiving transport is
//! gone, sends are swallowed and the turn still runs to completion so
//! the transcript stays whole.

use std::time::Instant;

use tokio::sync::mpsc;

use parlor_domain::agent::AgentProfile;
use parlor_domain::chat::{ChatMessage, Role};
use parlor_domain::stream::StreamEvent;
use parlor_domain::trace::TraceEvent;
use parlor_protocol::{ServerFrame, SourceEntry};
use parlor_retrieval::Snippet;
use parlor_sessions::{estimate_tokens, Session};
use parlor_providers::GenerationRequest;

use crate::state::AppState;

pub(crate) struct GenerationInput {
    pub session: Session,
    pub profile: AgentProfile,
    pub user_message: String,
    pub message_id: String,
}

/// Run one AI turn to completion, pushing frames into `tx`.
///
/// The user message is already in the transcript when this runs; the
/// assistant reply is appended here once the stream finishes cleanly.
pub(crate) async fn run_generation(
    state: AppState,
    input: GenerationInput,
    tx: mpsc::Sender<ServerFrame>,
) {
    let session_id = input.session.session_id.clone();
    let settings = &input.profile.settings;

    let _ = tx
        .send(ServerFrame::Start {
            message_id: input.message_id.clone(),
            model: settings.model.clone(),
            provider: settings.provider.clone(),
        })
        .await;

    // ── Context retrieval (best-effort) ───────────────────────────
    let snippets = retrieve_context(&state, &input).await;
    if !snippets.is_empty() {
        let _ = tx
            .send(ServerFrame::Context {
                message_id: input.message_id.clone(),
                sources: snippets
                    .iter()
                    .map(|s| SourceEntry {
                        source: s.source.clone(),
                        score: s.score,
                    })
                    .collect(),
            })
            .await;
    }

    // ── Request assembly ──────────────────────────────────────────
    let system_prompt = build_system_prompt(&settings.system_prompt, &snippets);
    let window = state.config.sessions.history_window;
    let history = match state.transcripts.recent(&session_id, window) {
        Ok(records) => records
            .into_iter()
            .map(|r| ChatMessage {
                role: r.role,
                content: r.content,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "history read failed");
            vec![ChatMessage::user(input.user_message.clone())]
        }
    };

    let req = GenerationRequest {
        system_prompt: Some(system_prompt),
        messages: history,
        model: settings.model.clone(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    // ── Provider dispatch + stream loop ───────────────────────────
    let provider = state.llm.select(&settings.provider);
    let started = Instant::now();

    let mut stream = match provider.chat_stream(&req).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "generation failed to start");
            let _ = tx
                .send(ServerFrame::Error {
                    error: e.to_string(),
                    message_id: Some(input.message_id.clone()),
                })
                .await;
            return;
        }
    };

    let mut full_response = String::new();
    let mut usage = None;
    use futures_util::StreamExt;

    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Token { text }) => {
                full_response.push_str(&text);
                let _ = tx
                    .send(ServerFrame::Chunk {
                        message_id: input.message_id.clone(),
                        content: text,
                    })
                    .await;
            }
            Ok(StreamEvent::Done { usage: u, .. }) => {
                if u.is_some() {
                    usage = u;
                }
            }
            Ok(StreamEvent::Error { message }) => {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: message,
                        message_id: Some(input.message_id.clone()),
                    })
                    .await;
                return;
            }
            Err(e) => {
                let _ = tx
                    .send(ServerFrame::Error {
                        error: e.to_string(),
                        message_id: Some(input.message_id.clone()),
                    })
                    .await;
                return;
            }
        }
    }

    TraceEvent::LlmRequest {
        provider: settings.provider.clone(),
        model: settings.model.clone(),
        session_id: session_id.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
        prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens),
        completion_tokens: usage.as_ref().map(|u| u.completion_tokens),
    }
    .emit();

    // ── Persist the assistant reply ───────────────────────────────
    let token_count = usage
        .as_ref()
        .map(|u| u.completion_tokens)
        .unwrap_or_else(|| estimate_tokens(&full_response));

    if let Err(e) =
        state
            .transcripts
            .append(&session_id, Role::Assistant, &full_response, token_count, None)
    {
        // The turn still terminates cleanly; the reply was delivered.
        tracing::warn!(session_id = %session_id, error = %e, "assistant transcript append failed");
    } else {
        state.sessions.record_message(&session_id, token_count);
    }
    if let Some(u) = &usage {
        state
            .sessions
            .record_usage(&session_id, u.prompt_tokens as u64);
    }

    let _ = tx
        .send(ServerFrame::End {
            message_id: input.message_id.clone(),
            full_response,
            sources: snippets.iter().map(|s| s.source.clone()).collect(),
        })
        .await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch context snippets for the turn. Any failure degrades to an
/// empty result — the turn must not die because the vector store did.
async fn retrieve_context(state: &AppState, input: &GenerationInput) -> Vec<Snippet> {
    if input.profile.knowledge_base_ids.is_empty() {
        return Vec::new();
    }

    let result = state
        .retriever
        .retrieve(
            &input.user_message,
            &input.session.tenant_id,
            &input.profile.knowledge_base_ids,
            state.config.retrieval.top_k,
        )
        .await;

    match result {
        Ok(snippets) => {
            TraceEvent::ContextRetrieved {
                session_id: input.session.session_id.clone(),
                snippets: snippets.len(),
                top_score: snippets.first().map(|s| s.score),
            }
            .emit();
            snippets
        }
        Err(e) => {
            TraceEvent::RetrievalDegraded {
                session_id: input.session.session_id.clone(),
                reason: e.to_string(),
            }
            .emit();
            Vec::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fold ranked context snippets into the agent's base prompt, with
/// numbered source citations.
pub(crate) fn build_system_prompt(base_prompt: &str, snippets: &[Snippet]) -> String {
    let mut prompt = if base_prompt.is_empty() {
        "You are a helpful AI assistant.".to_owned()
    } else {
        base_prompt.to_owned()
    };

    if snippets.is_empty() {
        return prompt;
    }

    prompt.push_str("\n\n## Relevant Context:\n");
    for (i, snippet) in snippets.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[Source {}: {}]\n{}\n",
            i + 1,
            snippet.source,
            snippet.content
        ));
    }
    prompt.push_str(
        "\n## Instructions:\n\
         - Use the provided context to answer questions accurately\n\
         - If the context doesn't contain relevant information, say so\n\
         - Always cite sources when using information from the context\n\
         - Be helpful, concise, and accurate\n",
    );
    prompt
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
