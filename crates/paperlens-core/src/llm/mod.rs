//! Chat-completion access with bounded retry.
//!
//! [`ChatBackend`] is the provider seam; [`ModelClient`] layers the retry
//! policy and output normalization on top of it.

pub mod openai;
pub mod parse;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use crate::retry::{RetryError, RetryPolicy};
use crate::text_utils::{char_len, truncate_chars};

pub use openai::OpenAiCompatible;
pub use parse::{ParsedReply, parse_json_response};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// Incremental text deltas in generation order.
pub type DeltaStream = BoxStream<'static, Result<String, ModelError>>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("API key is required. Set LLM_API_KEY / DASHSCOPE_API_KEY / OPENAI_API_KEY.")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, last: Box<ModelError> },
    #[error("Model returned empty output")]
    EmptyOutput,
}

impl ModelError {
    /// A missing credential or an empty reply is final; everything else is retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelError::MissingApiKey | ModelError::EmptyOutput)
    }
}

impl From<RetryError<ModelError>> for ModelError {
    fn from(err: RetryError<ModelError>) -> Self {
        match err {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, last } => ModelError::Exhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Provider seam for chat completions.
pub trait ChatBackend: Send + Sync {
    /// One-shot completion; returns the message content (possibly empty).
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;

    /// Open a token stream. Errors before the first delta are returned here;
    /// later ones arrive as stream items.
    fn stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, ModelError>> + Send + 'a>>;
}

#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ChatBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// One-shot chat with retry. The returned text is trimmed.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: model.to_string(),
            temperature,
            messages,
        };
        let backend = &self.backend;
        let request = &request;
        let text = self
            .retry
            .run("chat", |_| backend.complete(request), ModelError::is_retryable)
            .await?;

        let text = text.trim().to_string();
        tracing::debug!(
            model,
            chars = char_len(&text),
            preview = truncate_chars(&text, 160),
            "model reply"
        );
        Ok(text)
    }

    /// Streaming chat. Only opening the stream is retried; a failure after
    /// deltas have been delivered surfaces as a stream item.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<DeltaStream, ModelError> {
        let request = ChatRequest {
            model: model.to_string(),
            temperature,
            messages,
        };
        let backend = &self.backend;
        let request = &request;
        let stream = self
            .retry
            .run("chat_stream", |_| backend.stream(request), ModelError::is_retryable)
            .await?;
        tracing::debug!(model, "model stream opened");
        Ok(stream)
    }
}
