//! Example of preparing research observations for the reporter.
//!
//! With `BASIC_MODEL_API_KEY` set, observations are summarized by the
//! configured OpenAI-compatible endpoint. Without it a local stand-in model
//! keeps the first line of every chunk, so the example runs offline.
//!
//! Run with `RUST_LOG=scribe=info` to see the compression decisions.

use std::sync::Arc;

use async_trait::async_trait;
use scribe::completion::{CompletionError, CompletionModel, Message};
use scribe::config::CompressionConfig;
use scribe::observations::ObservationPipeline;
use scribe::providers::ClientRegistry;
use tracing_subscriber::EnvFilter;

/// Keeps the first line of the text after the prompt header.
struct FirstLineModel;

#[async_trait]
impl CompletionModel for FirstLineModel {
    fn model_name(&self) -> &str {
        "gpt-4o"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let prompt = messages.last().map(Message::content).unwrap_or_default();
        let body = prompt.rsplit("\n\n").next().unwrap_or_default();
        Ok(format!("- {}", body.lines().next().unwrap_or_default()))
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // A deliberately small budget so the summarizer runs.
    let config = CompressionConfig {
        max_observations_tokens: 2_000,
        summarizer_chunk_size: 500,
        summarizer_chunk_overlap: 50,
        ..Default::default()
    };

    let registry = ClientRegistry::from_env();
    let pipeline = if registry.settings().basic_model.api_key.is_some() {
        ObservationPipeline::from_registry(&registry, config).await?
    } else {
        ObservationPipeline::new(Arc::new(FirstLineModel), config)
    };

    let observations: Vec<String> = (1..=6)
        .map(|i| {
            format!(
                "Source {i}: solid-state battery supplier report.\n{}",
                "Cell energy density, cost per kWh and production capacity figures. ".repeat(60)
            )
        })
        .collect();

    let input = pipeline
        .prepare(&observations, "Compare solid-state battery suppliers")
        .await;

    println!("Decision: {:?} ({})", input.evaluation.decision, input.evaluation.reason);
    if let Some(summary) = &input.summary {
        println!(
            "Chunks: {}, fallbacks: {}, consolidated: {}",
            summary.chunks, summary.fallbacks, summary.consolidated
        );
    }
    println!("{}\n\n{}", input.source.note(), input.content);

    Ok(())
}
