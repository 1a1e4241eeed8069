//! Context compression for agent message lists.
//!
//! [`ContextCompressor`] keeps a conversation under a model's token ceiling by
//! replacing the largest tool results with LLM summaries.
//! [`compress_agent_messages`] wires it to the configured clients for a single
//! agent step.

mod compressor;
mod error;
mod step;

pub use compressor::{
    find_largest_tool_message, originating_tool_name, summary_message, ContextCompressor,
    ContextCompressorBuilder,
};
pub use error::CompressionError;
pub use step::compress_agent_messages;
