use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::count_with_fallback;
use crate::completion::CompletionModel;
use crate::compression::CompressionError;
use crate::config::CompressionConfig;
use crate::tokens::TokenCounter;

/// Observation token ceiling with a safety margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    max_tokens: usize,
    safety_margin: f64,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, safety_margin: f64) -> Result<Self, CompressionError> {
        if max_tokens == 0 {
            return Err(CompressionError::EmptyBudget);
        }
        if !(safety_margin > 0.0 && safety_margin <= 1.0) {
            return Err(CompressionError::InvalidSafetyMargin(safety_margin));
        }
        Ok(Self {
            max_tokens,
            safety_margin,
        })
    }

    pub fn from_config(config: &CompressionConfig) -> Result<Self, CompressionError> {
        Self::new(
            config.max_observations_tokens,
            config.compression_safety_margin,
        )
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    /// `floor(max_tokens * safety_margin)`, never above `max_tokens`.
    pub fn effective_threshold(&self) -> usize {
        ((self.max_tokens as f64 * self.safety_margin).floor() as usize).min(self.max_tokens)
    }
}

/// Where observations go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionDecision {
    /// Observations fit the budget and go to the reporter as they are.
    DirectToReporter,
    /// Observations must be summarized first.
    CompressFirst,
}

impl CompressionDecision {
    /// Name of the stage that should run next.
    pub fn next_step(&self) -> &'static str {
        match self {
            CompressionDecision::DirectToReporter => "reporter",
            CompressionDecision::CompressFirst => "summarizer",
        }
    }
}

/// Outcome of a budget check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEvaluation {
    pub decision: CompressionDecision,
    /// Tokens measured for the joined observations, 0 when there were none.
    pub estimated_tokens: usize,
    /// Human-readable explanation, including count and threshold when measured.
    pub reason: String,
}

impl BudgetEvaluation {
    fn direct(reason: impl Into<String>) -> Self {
        Self {
            decision: CompressionDecision::DirectToReporter,
            estimated_tokens: 0,
            reason: reason.into(),
        }
    }
}

/// Decides whether accumulated observations need compression before the
/// report is written.
///
/// Tokens are counted by the model when it supports exact counts, otherwise
/// by a [`TokenCounter`] for the same model name.
pub struct TokenBudgetEvaluator {
    model: Option<Arc<dyn CompletionModel>>,
    counter: TokenCounter,
    config: CompressionConfig,
}

impl std::fmt::Debug for TokenBudgetEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgetEvaluator")
            .field("model_name", &self.counter.model_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenBudgetEvaluator {
    pub fn new(model: Arc<dyn CompletionModel>, config: CompressionConfig) -> Self {
        Self {
            counter: TokenCounter::new(model.model_name()),
            model: Some(model),
            config,
        }
    }

    /// Evaluator that only uses local token counting for `model_name`.
    pub fn with_counter(model_name: impl Into<String>, config: CompressionConfig) -> Self {
        Self {
            model: None,
            counter: TokenCounter::new(model_name),
            config,
        }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Evaluate, treating any error as "no compression needed".
    pub fn evaluate<S: AsRef<str>>(&self, observations: &[S]) -> BudgetEvaluation {
        match self.try_evaluate(observations) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!("Token evaluation failed: {}, routing directly to reporter", e);
                BudgetEvaluation::direct(format!("Evaluation failed ({e}), no compression applied"))
            }
        }
    }

    /// Evaluate, returning an error when the configured budget is invalid.
    ///
    /// Blank observations are ignored. The rest are trimmed and joined with
    /// newlines before counting, and a count equal to the threshold still fits.
    pub fn try_evaluate<S: AsRef<str>>(
        &self,
        observations: &[S],
    ) -> Result<BudgetEvaluation, CompressionError> {
        tracing::info!("Token estimator analyzing observations size");

        if observations.is_empty() {
            tracing::info!("No observations found, routing directly to reporter");
            return Ok(BudgetEvaluation::direct("No observations to process"));
        }

        let valid: Vec<&str> = observations
            .iter()
            .map(|observation| observation.as_ref().trim())
            .filter(|observation| !observation.is_empty())
            .collect();

        if valid.is_empty() {
            tracing::info!("No valid observations found after filtering, routing directly to reporter");
            return Ok(BudgetEvaluation::direct("No valid texts to process"));
        }

        let budget = TokenBudget::from_config(&self.config)?;
        let combined = valid.join("\n");
        let token_count = count_with_fallback(self.model.as_deref(), &self.counter, &combined);
        let threshold = budget.effective_threshold();

        let evaluation = if token_count <= threshold {
            let reason = format!(
                "Token count ({token_count}) below threshold ({threshold}), no compression needed"
            );
            tracing::info!("Direct routing: {}", reason);
            BudgetEvaluation {
                decision: CompressionDecision::DirectToReporter,
                estimated_tokens: token_count,
                reason,
            }
        } else {
            let reason = format!(
                "Token count ({token_count}) exceeds threshold ({threshold}), compression required"
            );
            tracing::info!("Compression routing: {}", reason);
            BudgetEvaluation {
                decision: CompressionDecision::CompressFirst,
                estimated_tokens: token_count,
                reason,
            }
        };

        Ok(evaluation)
    }
}
