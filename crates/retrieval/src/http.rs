//! REST implementation of [`ContextRetriever`].
//!
//! Talks to an external vector-search service over one `POST /v1/search`
//! call. The client is created once at startup and reused; the
//! underlying `reqwest::Client` keeps a connection pool.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use parlor_domain::config::RetrievalConfig;
use parlor_domain::error::{Error, Result};

use crate::{ContextRetriever, Snippet};

/// REST-backed retriever.
pub struct HttpRetriever {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Snippet>,
}

impl HttpRetriever {
    pub fn new(cfg: &RetrievalConfig, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        // Missing key is tolerated: open deployments run without auth.
        let api_key = std::env::var(&cfg.api_key_env).ok();
        if api_key.is_none() {
            tracing::debug!(env_var = %cfg.api_key_env, "retrieval API key not set");
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

#[async_trait]
impl ContextRetriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        tenant_id: &str,
        knowledge_base_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<Snippet>> {
        let url = format!("{}/v1/search", self.base_url);
        let body = serde_json::json!({
            "query": query,
            "tenant_id": tenant_id,
            "knowledge_base_ids": knowledge_base_ids,
            "top_k": top_k,
        });

        let mut rb = self
            .http
            .post(&url)
            .header("X-Trace-Id", Uuid::new_v4().to_string())
            .json(&body);
        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }

        let resp = rb
            .send()
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Retrieval(format!(
                "search returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        tracing::debug!(
            tenant_id = %tenant_id,
            results = parsed.results.len(),
            "context search completed"
        );

        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_parses_results() {
        let parsed: SearchResponse = serde_json::from_str(
            r#"{"results":[
                {"content":"Our refund window is 30 days.","source":"refunds.md","score":0.91,"document_id":"d-7"},
                {"content":"Contact support via chat.","source":"contact.md","score":0.84}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].source, "refunds.md");
        assert!(parsed.results[1].document_id.is_none());
    }

    #[test]
    fn empty_body_means_no_results() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
