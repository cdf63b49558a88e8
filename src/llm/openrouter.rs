//! OpenRouter (`OpenAI`-compatible) streaming provider

use super::types::{ChatMessage, StreamEvent};
use super::{ChatModel, LlmError};
use crate::config::AppConfig;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Streaming client for an `OpenAI`-compatible chat-completions endpoint.
pub struct OpenRouterModel {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    url: String,
}

impl OpenRouterModel {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            url: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
        }
    }

    fn translate_request(&self, messages: &[ChatMessage]) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            stream: true,
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterModel {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError> {
        let request = self.translate_request(messages);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<WireErrorResponse>(&body)
                .map_or(body, |e| e.error.message);

            let mut error = match status.as_u16() {
                401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
                429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
                500..=599 => LlmError::server_error(format!("Server error: {message}")),
                _ => LlmError::unknown(format!("HTTP {status}: {message}")),
            };
            if let Some(delay) = retry_after {
                error = error.with_retry_after(delay);
            }
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(64);
        let mut body = response.bytes_stream();

        tokio::spawn(async move {
            // SSE chunks are not line-aligned; carry the remainder between reads.
            let mut buffer = String::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(LlmError::network(format!(
                                "Stream interrupted: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line: String = buffer.drain(..=line_end).collect();

                    match parse_sse_line(line.trim()) {
                        SseLine::Delta(text) => {
                            if tx.send(StreamEvent::Delta(text)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => {
                            let _ = tx.send(StreamEvent::Done).await;
                            return;
                        }
                        SseLine::Ignored => {}
                    }
                }
            }

            // Upstream closed the connection without a terminator; the
            // fragments received so far form the complete response.
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Interpretation of one line of the event stream.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Ignored,
}

/// Parse a single SSE line from a chat-completions stream.
///
/// Comment lines, blank keep-alives, empty deltas (role-only chunks), and
/// unparseable payloads are all ignored rather than treated as failures.
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<WireChunk>(data) else {
        return SseLine::Ignored;
    };

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
    {
        Some(content) if !content.is_empty() => SseLine::Delta(content),
        _ => SseLine::Ignored,
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn content_delta_is_extracted() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"index":0}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Delta("Hel".to_string()));
    }

    #[test]
    fn done_marker_terminates() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    }

    #[test]
    fn role_only_chunk_is_ignored() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"},"index":0}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Ignored);
    }

    #[test]
    fn empty_delta_is_ignored() {
        let line = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Ignored);
    }

    #[test]
    fn keepalives_and_comments_are_ignored() {
        assert_eq!(parse_sse_line(""), SseLine::Ignored);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Ignored);
        assert_eq!(parse_sse_line("event: ping"), SseLine::Ignored);
    }

    #[test]
    fn usage_only_final_chunk_is_ignored() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        assert_eq!(parse_sse_line(line), SseLine::Ignored);
    }

    #[test]
    fn malformed_payload_is_ignored() {
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Ignored);
    }

    #[test]
    fn request_carries_history_in_order() {
        let config = AppConfig {
            api_key: "sk-or-test".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemma-3n-e4b-it:free".to_string(),
            temperature: 0.0,
            port: 8000,
        };
        let model = OpenRouterModel::new(&config);

        let history = [
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Bye"),
        ];
        let request = model.translate_request(&history);

        assert_eq!(request.model, "google/gemma-3n-e4b-it:free");
        assert!(request.stream);
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, Role::User.as_str());
        assert_eq!(request.messages[1].role, Role::Assistant.as_str());
        assert_eq!(request.messages[2].content, "Bye");
    }

    #[test]
    fn endpoint_url_tolerates_trailing_slash() {
        let config = AppConfig {
            api_key: "sk-or-test".to_string(),
            base_url: "http://localhost:9999/v1/".to_string(),
            model: "test".to_string(),
            temperature: 0.0,
            port: 8000,
        };
        let model = OpenRouterModel::new(&config);
        assert_eq!(model.url, "http://localhost:9999/v1/chat/completions");
    }
}
