//! Token counting and model context-window resolution.

mod counter;
pub mod estimator;
mod models;

pub(crate) use counter::cl100k;
pub use counter::{count_messages, count_text, CountTier, TokenCount, TokenCounter};
pub use models::{
    catalogued_context_window, default_context_window, resolve_token_limit,
    tokenizer_model_name, LimitSource, TokenLimit, DEFAULT_SAFETY_MARGIN, DEFAULT_TOKEN_LIMIT,
};
