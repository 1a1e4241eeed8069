use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::evaluator::{BudgetEvaluation, CompressionDecision, TokenBudgetEvaluator};
use super::summarizer::{MapReduceSummarizer, SummaryResult};
use crate::completion::CompletionModel;
use crate::config::CompressionConfig;
use crate::providers::{AgentRole, ClientRegistry, ProviderError};

/// Which text the reporter receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Summarized,
    Original,
}

impl ReportSource {
    /// Note shown alongside the report so readers know what it was built from.
    pub fn note(&self) -> &'static str {
        match self {
            ReportSource::Summarized => {
                "Note: this report is based on an intelligent summary of the research content."
            }
            ReportSource::Original => {
                "Note: this report is based on the complete research content."
            }
        }
    }
}

/// Content handed to report generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportInput {
    pub content: String,
    pub source: ReportSource,
    pub evaluation: BudgetEvaluation,
    pub summary: Option<SummaryResult>,
}

/// Evaluate observations and summarize them when they exceed the budget.
#[derive(Debug)]
pub struct ObservationPipeline {
    evaluator: TokenBudgetEvaluator,
    summarizer: MapReduceSummarizer,
}

impl ObservationPipeline {
    pub fn new(model: Arc<dyn CompletionModel>, config: CompressionConfig) -> Self {
        Self {
            evaluator: TokenBudgetEvaluator::new(model.clone(), config.clone()),
            summarizer: MapReduceSummarizer::new(model, config),
        }
    }

    /// Pipeline running on the researcher's model.
    pub async fn from_registry(
        registry: &ClientRegistry,
        config: CompressionConfig,
    ) -> Result<Self, ProviderError> {
        let model = registry.get_for_agent(AgentRole::Researcher).await?;
        Ok(Self::new(model, config))
    }

    pub fn evaluator(&self) -> &TokenBudgetEvaluator {
        &self.evaluator
    }

    pub fn summarizer(&self) -> &MapReduceSummarizer {
        &self.summarizer
    }

    pub async fn prepare<S: AsRef<str>>(
        &self,
        observations: &[S],
        task_context: &str,
    ) -> ReportInput {
        let evaluation = self.evaluator.evaluate(observations);

        let summary = match evaluation.decision {
            CompressionDecision::DirectToReporter => None,
            CompressionDecision::CompressFirst => {
                Some(self.summarizer.summarize(observations, task_context).await)
            }
        };

        match summary {
            Some(summary) if !summary.text.is_empty() => {
                tracing::info!("Using summarized observations for report generation");
                ReportInput {
                    content: summary.text.clone(),
                    source: ReportSource::Summarized,
                    evaluation,
                    summary: Some(summary),
                }
            }
            summary => {
                tracing::info!("Using original observations for report generation");
                let content = observations
                    .iter()
                    .map(|observation| observation.as_ref())
                    .collect::<Vec<&str>>()
                    .join("\n\n");
                ReportInput {
                    content,
                    source: ReportSource::Original,
                    evaluation,
                    summary,
                }
            }
        }
    }
}
