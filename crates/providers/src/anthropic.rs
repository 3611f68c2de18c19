//! Anthropic Messages API adapter.
//!
//! The Messages API differs from the chat completions contract in two
//! ways that matter here: the system prompt is a top-level field rather
//! than a message, and the SSE stream is typed (`message_start`,
//! `content_block_delta`, `message_delta`, `message_stop`) instead of
//! uniform delta chunks, so the parser keeps state across payloads.

use std::time::Duration;

use serde_json::Value;

use parlor_domain::chat::{ChatMessage, Role};
use parlor_domain::config::ProviderConfig;
use parlor_domain::error::{Error, Result};
use parlor_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::sse::sse_event_stream;
use crate::traits::{ChatProvider, GenerationRequest};
use crate::util::{api_key_from_env, from_reqwest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(id: &str, cfg: &ProviderConfig, timeout_ms: u64) -> Result<Self> {
        let api_key = api_key_from_env(id, &cfg.api_key_env)?;
        let base_url = cfg
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_owned();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: id.to_owned(),
            base_url,
            api_key,
            client,
        })
    }

    fn build_body(&self, req: &GenerationRequest) -> Value {
        // System-role history entries fold into the top-level system
        // field; human-agent entries ride as assistant turns.
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(prompt) = req.system_prompt.as_deref() {
            system_parts.push(prompt);
        }

        let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len());
        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                role => messages.push(msg_to_wire(role, msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "stream": true,
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }

        body
    }
}

fn msg_to_wire(role: Role, msg: &ChatMessage) -> Value {
    let wire_role = match role {
        Role::Assistant | Role::HumanAgent => "assistant",
        _ => "user",
    };
    serde_json::json!({ "role": wire_role, "content": msg.content })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parser state carried across SSE payloads of one completion.
#[derive(Default)]
struct StreamState {
    usage: Option<Usage>,
    done_emitted: bool,
}

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop".to_owned(),
        "max_tokens" => "length".to_owned(),
        other => other.to_owned(),
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens").and_then(|t| t.as_u64()).unwrap_or(0) as u32;
    let output = v.get("output_tokens").and_then(|t| t.as_u64()).unwrap_or(0) as u32;
    if input == 0 && output == 0 {
        return None;
    }
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

fn parse_payload(state: &mut StreamState, data: &str) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");
    match event_type {
        "message_start" => {
            // Prompt token count arrives up front, completion count later.
            if let Some(usage) = v
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(parse_usage)
            {
                state.usage = Some(usage);
            }
            Vec::new()
        }
        "content_block_delta" => {
            let delta = v.get("delta").unwrap_or(&Value::Null);
            if delta.get("type").and_then(|t| t.as_str()) == Some("text_delta") {
                if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        return vec![Ok(StreamEvent::Token {
                            text: text.to_owned(),
                        })];
                    }
                }
            }
            Vec::new()
        }
        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|t| t.as_u64())
            {
                let usage = state.usage.get_or_insert(Usage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                });
                usage.completion_tokens = output as u32;
                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
            }

            if let Some(reason) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|r| r.as_str())
            {
                state.done_emitted = true;
                return vec![Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    finish_reason: Some(map_stop_reason(reason)),
                })];
            }
            Vec::new()
        }
        "message_stop" => {
            if state.done_emitted {
                return Vec::new();
            }
            state.done_emitted = true;
            vec![Ok(StreamEvent::Done {
                usage: state.usage.clone(),
                finish_reason: Some("stop".into()),
            })]
        }
        "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error")
                .to_owned();
            vec![Ok(StreamEvent::Error { message })]
        }
        // ping, content_block_start, content_block_stop
        _ => Vec::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatProvider for AnthropicProvider {
    async fn chat_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/messages", self.base_url);
        let body = self.build_body(req);

        tracing::debug!(provider = %self.id, model = %req.model, "anthropic stream request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let mut state = StreamState::default();
        Ok(sse_event_stream(resp, move |data| {
            parse_payload(&mut state, data)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_becomes_token() {
        let mut state = StreamState::default();
        let events = parse_payload(
            &mut state,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        );
        match events[0].as_ref().unwrap() {
            StreamEvent::Token { text } => assert_eq!(text, "Hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn usage_spans_message_start_and_delta() {
        let mut state = StreamState::default();
        parse_payload(
            &mut state,
            r#"{"type":"message_start","message":{"usage":{"input_tokens":20,"output_tokens":1}}}"#,
        );
        let events = parse_payload(
            &mut state,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}"#,
        );
        match events[0].as_ref().unwrap() {
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                let usage = usage.as_ref().unwrap();
                assert_eq!(usage.prompt_tokens, 20);
                assert_eq!(usage.completion_tokens, 9);
                assert_eq!(usage.total_tokens, 29);
                assert_eq!(finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn message_stop_is_swallowed_after_done() {
        let mut state = StreamState::default();
        parse_payload(
            &mut state,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
        );
        let events = parse_payload(&mut state, r#"{"type":"message_stop"}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn message_stop_without_delta_is_done_fallback() {
        let mut state = StreamState::default();
        let events = parse_payload(&mut state, r#"{"type":"message_stop"}"#);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { .. }
        ));
    }

    #[test]
    fn max_tokens_stop_reason_maps_to_length() {
        assert_eq!(map_stop_reason("max_tokens"), "length");
        assert_eq!(map_stop_reason("end_turn"), "stop");
        assert_eq!(map_stop_reason("stop_sequence"), "stop_sequence");
    }

    #[test]
    fn stream_error_event_surfaces_message() {
        let mut state = StreamState::default();
        let events = parse_payload(
            &mut state,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        match events[0].as_ref().unwrap() {
            StreamEvent::Error { message } => assert_eq!(message, "Overloaded"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ping_is_ignored() {
        let mut state = StreamState::default();
        assert!(parse_payload(&mut state, r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn body_lifts_system_messages_to_top_level() {
        let provider = AnthropicProvider {
            id: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: "sk-ant-test".into(),
            client: reqwest::Client::new(),
        };
        let req = GenerationRequest {
            system_prompt: Some("be helpful".into()),
            messages: vec![
                ChatMessage::system("extra context"),
                ChatMessage::user("hello"),
                ChatMessage {
                    role: Role::HumanAgent,
                    content: "a human replied".into(),
                },
            ],
            model: "claude-sonnet-4-20250514".into(),
            temperature: 0.5,
            max_tokens: 1024,
        };
        let body = provider.build_body(&req);
        assert_eq!(body["system"], "be helpful\n\nextra context");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 1024);
    }
}
