//! Scribe keeps research agents inside their LLM context windows.
//!
//! # Overview
//! Two independent mechanisms are provided:
//! - [`compression::ContextCompressor`] rewrites a single agent step's message
//!   list, replacing the largest tool results with LLM summaries until the
//!   list fits the model's token ceiling.
//! - [`observations::ObservationPipeline`] decides once per research run
//!   whether accumulated observations fit the reporter's budget and, if not,
//!   shrinks them with a map-reduce summarization.
//!
//! Both count tokens with [`tokens::TokenCounter`], which uses an exact BPE
//! tokenizer when the model is known and falls back to character estimates.
//!
//! # Example
//! ```ignore
//! use scribe::config::{CompressionConfig, Settings};
//! use scribe::observations::ObservationPipeline;
//! use scribe::providers::ClientRegistry;
//!
//! let registry = ClientRegistry::new(Settings::from_env());
//! let pipeline = ObservationPipeline::from_registry(&registry, CompressionConfig::default()).await?;
//!
//! let input = pipeline.prepare(&observations, "Compare solid-state battery suppliers").await;
//! println!("{}\n\n{}", input.source.note(), input.content);
//! ```
//!
//! # Failure policy
//! Configuration problems are returned from constructors. Once running,
//! compression is an optimization: a failed LLM call keeps the original text
//! and is logged through [`tracing`].

pub mod chunking;
pub mod completion;
pub mod compression;
pub mod config;
pub mod observations;
pub mod providers;
pub mod tokens;

pub use chunking::{split_text_into_chunks, ChunkSplitter};
pub use completion::{CompletionError, CompletionModel, Message};
