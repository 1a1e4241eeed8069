//! The LLM invocation contract consumed by the compression pipeline.
//!
//! Everything here is provider agnostic: a [`CompletionModel`] turns a list of
//! [`Message`]s into response text and can optionally report an exact token
//! count for a piece of text. Concrete clients live in [`crate::providers`].

pub mod message;

use async_trait::async_trait;
use thiserror::Error;

pub use message::{Message, Role, ToolCall};

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider returned an invalid response: {0}")]
    ResponseError(String),
    #[error("Provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },
    #[error("Token counting is not supported for model '{0}'")]
    TokenCountUnsupported(String),
}

/// A configured LLM client.
///
/// Implementations are shared between components behind an `Arc`, so the
/// trait is object safe and requires `Send + Sync`.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Name of the backing model, used for token counting and logging.
    fn model_name(&self) -> &str;

    /// Send the messages and return the text content of the response.
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError>;

    /// Send a single user prompt.
    async fn prompt(&self, prompt: &str) -> Result<String, CompletionError> {
        self.complete(&[Message::human(prompt)]).await
    }

    /// Exact token count for `text` as seen by this model.
    ///
    /// Callers must treat an error as "unknown" and fall back to an estimate.
    fn count_tokens(&self, _text: &str) -> Result<usize, CompletionError> {
        Err(CompletionError::TokenCountUnsupported(
            self.model_name().to_string(),
        ))
    }
}
