//! Errors raised while setting up compression.
//!
//! Only construction and configuration problems surface here. Failures during
//! compression itself (a summarization call that errors, a message that cannot
//! be shrunk) degrade to keeping the original content and are logged instead.

use thiserror::Error;

use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Model name must not be empty")]
    MissingModelName,
    #[error("Safety margin must be in (0, 1], got {0}")]
    InvalidSafetyMargin(f64),
    #[error("Token budget must be positive")]
    EmptyBudget,
    #[error("Summarizer model unavailable: {0}")]
    SummarizerUnavailable(#[from] ProviderError),
}
