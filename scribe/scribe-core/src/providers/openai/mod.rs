//! OpenAI-compatible chat-completions provider.
//!
//! Works with any endpoint that speaks `POST {base_url}/chat/completions`
//! (Volcengine Ark, DeepSeek, vLLM and OpenAI itself).
//!
//! # Example
//! ```ignore
//! use scribe::providers::openai;
//!
//! let client = openai::Client::builder("sk-...", "deepseek-chat")
//!     .base_url("https://api.deepseek.com/v1")
//!     .build()?;
//! ```

mod client;
mod completion;

pub use client::{Client, ClientBuilder, DEFAULT_BASE_URL};
pub use completion::{ChatMessage, ChatRequest, ChatResponse};
