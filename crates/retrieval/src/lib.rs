//! Knowledge-base context retrieval.
//!
//! The generation pipeline asks a [`ContextRetriever`] for snippets
//! relevant to the user's message, scoped to the tenant and the agent's
//! knowledge bases. Retrieval is best-effort by contract: the pipeline
//! treats any failure as an empty result and generates without context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parlor_domain::config::RetrievalConfig;
use parlor_domain::error::Result;

mod http;

pub use http::HttpRetriever;

/// One retrieved context snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub content: String,
    /// Human-readable origin, e.g. the original filename.
    pub source: String,
    /// Similarity score from the vector store.
    pub score: f32,
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Lookup contract the pipeline consumes.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Fetch up to `top_k` snippets for a query, scoped to one tenant.
    /// An empty `knowledge_base_ids` slice means no scoping filter.
    async fn retrieve(
        &self,
        query: &str,
        tenant_id: &str,
        knowledge_base_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<Snippet>>;
}

/// Retriever used when no retrieval backend is configured. Always
/// returns no snippets, so agents answer from the conversation alone.
pub struct NullRetriever;

#[async_trait]
impl ContextRetriever for NullRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        _tenant_id: &str,
        _knowledge_base_ids: &[String],
        _top_k: usize,
    ) -> Result<Vec<Snippet>> {
        Ok(Vec::new())
    }
}

/// Build the retriever the config calls for.
pub fn from_config(cfg: &RetrievalConfig) -> Result<std::sync::Arc<dyn ContextRetriever>> {
    match cfg.base_url.as_deref() {
        Some(base_url) => Ok(std::sync::Arc::new(HttpRetriever::new(cfg, base_url)?)),
        None => {
            tracing::info!("no retrieval backend configured, context retrieval disabled");
            Ok(std::sync::Arc::new(NullRetriever))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_retriever_returns_nothing() {
        let snippets = NullRetriever
            .retrieve("anything", "t1", &[], 5)
            .await
            .unwrap();
        assert!(snippets.is_empty());
    }

    #[test]
    fn snippet_deserializes_without_document_id() {
        let s: Snippet =
            serde_json::from_str(r#"{"content":"c","source":"faq.md","score":0.9}"#).unwrap();
        assert!(s.document_id.is_none());
    }
}
