//! Map-reduce summarization of oversized observations.
//!
//! Observations are joined and split into overlapping token chunks. Each
//! chunk is summarized independently (map), then the summaries are joined in
//! chunk order and optionally consolidated by one more LLM call (reduce).
//! Every LLM failure degrades to keeping text rather than losing it.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::count_with_fallback;
use crate::chunking::ChunkSplitter;
use crate::completion::{CompletionModel, Message};
use crate::config::CompressionConfig;
use crate::tokens::TokenCounter;

/// The reduce pass only consolidates when the joined summaries exceed
/// `max_observations_tokens / SECOND_PASS_BUDGET_DIVISOR`.
pub const SECOND_PASS_BUDGET_DIVISOR: usize = 2;

/// Chunks summarized concurrently during the map phase.
pub const DEFAULT_MAP_CONCURRENCY: usize = 4;

const EXTRACTION_INSTRUCTION: &str = "You are a professional information extraction assistant. \
Please extract all key facts, data, opinions and citations from the following text based on the \
given research task. Ignore marketing rhetoric, navigation links and generic descriptions \
unrelated to the task. Output in bullet points, maintaining accuracy and completeness.";

const CONSOLIDATION_INSTRUCTION: &str = "You are a professional information integration \
assistant. Please consolidate the following fragmented summaries into a coherent, concise \
report. Retain all key facts, data and opinions, remove duplicate content, and ensure logical \
flow and completeness.";

/// One unit of map work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the split text. Summaries are joined in this order.
    pub index: usize,
    /// Chunk text as produced by the splitter.
    pub text: String,
    /// Research task the extraction is focused on, shared by all chunks.
    pub task_context: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// The model returned a summary.
    Summarized,
    /// The chunk was blank, no call was made.
    Skipped,
    /// The call failed and the chunk text was kept verbatim.
    Fallback,
}

/// Map output for one [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Index of the chunk this summarizes.
    pub index: usize,
    /// Summary text, empty for skipped chunks, the chunk itself on fallback.
    pub text: String,
    pub outcome: ChunkOutcome,
}

/// Final summary plus what happened along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Text handed to the reporter.
    pub text: String,
    /// Number of chunks dispatched to the map phase.
    pub chunks: usize,
    /// Chunks whose summary call failed and were kept verbatim.
    pub fallbacks: usize,
    /// Blank chunks that needed no call.
    pub skipped: usize,
    /// Whether the second pass replaced the joined summaries.
    pub consolidated: bool,
}

/// Shrinks observations with one extraction call per chunk and an optional
/// consolidation call over the joined results.
///
/// # Example
/// ```ignore
/// use scribe::observations::MapReduceSummarizer;
///
/// let summarizer = MapReduceSummarizer::new(model, config).with_concurrency(2);
/// let result = summarizer.summarize(&observations, "Compare battery suppliers").await;
/// println!("{} chunks, {} kept verbatim", result.chunks, result.fallbacks);
/// ```
pub struct MapReduceSummarizer {
    model: Arc<dyn CompletionModel>,
    counter: TokenCounter,
    config: CompressionConfig,
    concurrency: usize,
}

impl std::fmt::Debug for MapReduceSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapReduceSummarizer")
            .field("model", &self.model.model_name())
            .field("config", &self.config)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl MapReduceSummarizer {
    /// Summarizer calling `model` for both phases, with chunking and
    /// second-pass settings from `config`.
    pub fn new(model: Arc<dyn CompletionModel>, config: CompressionConfig) -> Self {
        Self {
            counter: TokenCounter::new(model.model_name()),
            model,
            config,
            concurrency: DEFAULT_MAP_CONCURRENCY,
        }
    }

    /// Limit how many chunk summaries are in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Summarize `observations` for the research task described by `task_context`.
    pub async fn summarize<S: AsRef<str>>(
        &self,
        observations: &[S],
        task_context: &str,
    ) -> SummaryResult {
        tracing::info!("Summarizer starting map-reduce process");

        let chunks = self.dispatch(observations, task_context);
        let chunk_count = chunks.len();
        let summaries = self.map(chunks).await;

        let fallbacks = count_outcome(&summaries, ChunkOutcome::Fallback);
        let skipped = count_outcome(&summaries, ChunkOutcome::Skipped);
        let texts: Vec<String> = summaries.into_iter().map(|summary| summary.text).collect();

        let (text, consolidated) = self
            .reduce_inner(
                &texts,
                task_context,
                self.config.summarizer_enable_second_pass,
            )
            .await;

        tracing::info!(
            chunks = chunk_count,
            fallbacks,
            skipped,
            consolidated,
            "Final summarized content: {} characters",
            text.chars().count()
        );

        SummaryResult {
            text,
            chunks: chunk_count,
            fallbacks,
            skipped,
            consolidated,
        }
    }

    /// Split observations into map work.
    ///
    /// No observations still yields a single empty chunk so that the reduce
    /// phase always has input.
    pub fn dispatch<S: AsRef<str>>(&self, observations: &[S], task_context: &str) -> Vec<Chunk> {
        if observations.is_empty() {
            tracing::warn!("No observations to summarize, creating empty task for reduce phase");
            return vec![Chunk {
                index: 0,
                text: String::new(),
                task_context: Arc::from(""),
            }];
        }

        let combined = observations
            .iter()
            .map(|observation| observation.as_ref())
            .collect::<Vec<&str>>()
            .join("\n\n");
        let splitter = ChunkSplitter::new(
            self.config.summarizer_chunk_size,
            self.config.summarizer_chunk_overlap,
        );
        let task_context: Arc<str> = Arc::from(task_context);

        let chunks: Vec<Chunk> = splitter
            .split(&combined)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text,
                task_context: task_context.clone(),
            })
            .collect();

        tracing::info!("Split content into {} chunks for parallel processing", chunks.len());
        chunks
    }

    /// Summarize one chunk. Never fails: a blank chunk gives an empty summary
    /// and an LLM error gives the chunk text back unchanged.
    pub async fn summarize_chunk(&self, chunk: &Chunk) -> ChunkSummary {
        tracing::info!("Processing chunk {}", chunk.index);

        let text = chunk.text.trim();
        if text.is_empty() {
            tracing::warn!("Chunk {} is empty, skipping", chunk.index);
            return ChunkSummary {
                index: chunk.index,
                text: String::new(),
                outcome: ChunkOutcome::Skipped,
            };
        }

        let messages = [
            Message::system(EXTRACTION_INSTRUCTION),
            Message::human(format!(
                "Research task:{}\n\nPlease extract key information related to the above task from:\n\n{}",
                chunk.task_context, text
            )),
        ];

        match self.model.complete(&messages).await {
            Ok(summary) => {
                let summary = summary.trim().to_string();
                tracing::debug!(
                    "Chunk {} summarized: {} characters",
                    chunk.index,
                    summary.chars().count()
                );
                ChunkSummary {
                    index: chunk.index,
                    text: summary,
                    outcome: ChunkOutcome::Summarized,
                }
            }
            Err(e) => {
                tracing::error!("Error processing chunk {}: {}", chunk.index, e);
                ChunkSummary {
                    index: chunk.index,
                    text: chunk.text.clone(),
                    outcome: ChunkOutcome::Fallback,
                }
            }
        }
    }

    /// Summarize all chunks concurrently. Results are in chunk-index order.
    pub async fn map(&self, chunks: Vec<Chunk>) -> Vec<ChunkSummary> {
        let mut summaries: Vec<ChunkSummary> = stream::iter(chunks.iter())
            .map(|chunk| self.summarize_chunk(chunk))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        summaries.sort_by_key(|summary| summary.index);
        summaries
    }

    /// Join chunk summaries, consolidating them with the model when the
    /// second pass is enabled and the joined text is still large.
    pub async fn reduce(
        &self,
        summaries: &[String],
        task_context: &str,
        second_pass_enabled: bool,
    ) -> String {
        self.reduce_inner(summaries, task_context, second_pass_enabled)
            .await
            .0
    }

    async fn reduce_inner(
        &self,
        summaries: &[String],
        task_context: &str,
        second_pass_enabled: bool,
    ) -> (String, bool) {
        tracing::info!("Reducing and combining summaries");

        if summaries.is_empty() {
            tracing::warn!("No summaries to reduce");
            return (String::new(), false);
        }

        let combined = summaries.join("\n\n");
        if !second_pass_enabled {
            return (combined, false);
        }

        let combined_tokens = count_with_fallback(Some(self.model.as_ref()), &self.counter, &combined);
        let gate = self.config.max_observations_tokens / SECOND_PASS_BUDGET_DIVISOR;
        if combined_tokens <= gate {
            tracing::info!(
                "Skipping second-pass compression: {} tokens below threshold",
                combined_tokens
            );
            return (combined, false);
        }

        tracing::info!(
            "Performing second-pass compression (current: {} tokens)",
            combined_tokens
        );

        let messages = [
            Message::system(CONSOLIDATION_INSTRUCTION),
            Message::human(format!(
                "Research task: {task_context}\n\nPlease consolidate the following summaries: \n\n{combined}"
            )),
        ];

        match self.model.complete(&messages).await {
            Ok(summary) => {
                let summary = summary.trim().to_string();
                tracing::info!(
                    "Second-pass compression completed: {} characters",
                    summary.chars().count()
                );
                (summary, true)
            }
            Err(e) => {
                tracing::error!(
                    "Error during second-pass compression: {}, using combined summaries",
                    e
                );
                (combined, false)
            }
        }
    }
}

fn count_outcome(summaries: &[ChunkSummary], outcome: ChunkOutcome) -> usize {
    summaries
        .iter()
        .filter(|summary| summary.outcome == outcome)
        .count()
}
