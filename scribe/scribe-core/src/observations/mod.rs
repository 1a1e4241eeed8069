//! Observation budgeting and summarization before report generation.
//!
//! A research run accumulates observations (tool outputs, agent findings).
//! [`TokenBudgetEvaluator`] decides once whether they fit the reporter's
//! budget, [`MapReduceSummarizer`] shrinks them when they do not, and
//! [`ObservationPipeline`] chains both into the reporter's input.

mod evaluator;
mod pipeline;
mod summarizer;

pub use evaluator::{BudgetEvaluation, CompressionDecision, TokenBudget, TokenBudgetEvaluator};
pub use pipeline::{ObservationPipeline, ReportInput, ReportSource};
pub use summarizer::{
    Chunk, ChunkOutcome, ChunkSummary, MapReduceSummarizer, SummaryResult,
    DEFAULT_MAP_CONCURRENCY, SECOND_PASS_BUDGET_DIVISOR,
};

use crate::completion::CompletionModel;
use crate::tokens::TokenCounter;

/// Ask the model for an exact count, falling back to the local counter.
pub(crate) fn count_with_fallback(
    model: Option<&dyn CompletionModel>,
    counter: &TokenCounter,
    text: &str,
) -> usize {
    if let Some(model) = model {
        match model.count_tokens(text) {
            Ok(tokens) => return tokens,
            Err(e) => tracing::warn!(
                "Error calculating tokens with LLM: {}, using approximate calculation",
                e
            ),
        }
    }
    counter.count_text(text).tokens
}
