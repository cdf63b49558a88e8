//! Model provider abstraction
//!
//! Provides a streaming interface to a hosted chat-completion capability.

mod error;
mod openrouter;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openrouter::OpenRouterModel;
pub use types::{ChatMessage, Role, StreamEvent};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Streaming interface to a chat-completion capability.
///
/// A successful call yields a finite sequence of [`StreamEvent`]s ending in
/// `Done` (or cut short by a single `Error`). The receiver is not
/// restartable; dropping it abandons the in-flight completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streamed completion over the full ordered history.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for chat models
pub struct LoggingModel {
    inner: Arc<dyn ChatModel>,
    model_id: String,
}

impl LoggingModel {
    pub fn new(inner: Arc<dyn ChatModel>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ChatModel for LoggingModel {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError> {
        let start = std::time::Instant::now();
        let context_len = messages.len();

        let mut inner_rx = match self.inner.stream_chat(messages).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    context_len,
                    error = %e.message,
                    error_kind = e.kind.label(),
                    retryable = e.kind.is_retryable(),
                    "Model request failed to start"
                );
                return Err(e);
            }
        };

        // Forward events through a fresh channel so completion of the whole
        // stream can be observed and logged in one place.
        let (tx, rx) = mpsc::channel(64);
        let model_id = self.model_id.clone();
        tokio::spawn(async move {
            let mut fragments: u64 = 0;
            let mut bytes: u64 = 0;
            while let Some(event) = inner_rx.recv().await {
                match &event {
                    StreamEvent::Delta(text) => {
                        fragments += 1;
                        bytes += text.len() as u64;
                    }
                    StreamEvent::Done => {
                        tracing::info!(
                            model = %model_id,
                            duration_ms = %start.elapsed().as_millis(),
                            context_len,
                            fragments,
                            bytes,
                            "Model stream completed"
                        );
                    }
                    StreamEvent::Error(e) => {
                        tracing::error!(
                            model = %model_id,
                            duration_ms = %start.elapsed().as_millis(),
                            fragments,
                            error = %e.message,
                            error_kind = e.kind.label(),
                            retryable = e.kind.is_retryable(),
                            "Model stream failed"
                        );
                    }
                }
                if tx.send(event).await.is_err() {
                    // Consumer went away; abandon the completion.
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
