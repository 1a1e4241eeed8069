//! Greedy, summary-based compression of an agent step's message list.
//!
//! While the conversation is over its token ceiling, the largest tool result
//! is summarized by an LLM and replaced in place with an annotated summary.
//! Tool outputs (search results, crawled pages) are where the bulk of the
//! tokens live, so only `Tool` messages are ever rewritten.

use std::collections::HashSet;
use std::sync::Arc;

use crate::completion::{CompletionModel, Message};
use crate::providers::{ClientRegistry, LlmTier};
use crate::tokens::{resolve_token_limit, TokenCounter, DEFAULT_SAFETY_MARGIN};

use super::error::CompressionError;

/// Instruction prefixed to the content being summarized.
const SUMMARIZATION_PROMPT: &str = "Please summarize the following content concisely:";

/// Name attached to replacement messages so transcripts show they were generated.
const SUMMARY_MESSAGE_NAME: &str = "system";

/// Builder for [`ContextCompressor`].
#[derive(Debug, Clone)]
pub struct ContextCompressorBuilder {
    model_name: String,
    override_limit: Option<usize>,
    safety_margin: f64,
}

impl ContextCompressorBuilder {
    /// Use a fixed token limit instead of the model's context window.
    /// The safety margin does not apply to an override.
    pub fn override_limit(mut self, limit: Option<usize>) -> Self {
        self.override_limit = limit;
        self
    }

    /// Fraction of the model's context window to allow.
    pub fn safety_margin(mut self, safety_margin: f64) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Build with an explicit summarizer model.
    pub fn build(
        self,
        summarizer: Arc<dyn CompletionModel>,
    ) -> Result<ContextCompressor, CompressionError> {
        if self.model_name.trim().is_empty() {
            return Err(CompressionError::MissingModelName);
        }
        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            return Err(CompressionError::InvalidSafetyMargin(self.safety_margin));
        }

        let limit = resolve_token_limit(&self.model_name, self.override_limit, self.safety_margin);

        Ok(ContextCompressor {
            summarizer,
            counter: TokenCounter::new(self.model_name),
            token_limit: limit.tokens,
        })
    }

    /// Build with the registry's basic-tier model as summarizer.
    pub async fn build_with_registry(
        self,
        registry: &ClientRegistry,
    ) -> Result<ContextCompressor, CompressionError> {
        let summarizer = registry.get(LlmTier::Basic).await?;
        self.build(summarizer)
    }
}

/// Keeps a message list under a token ceiling by summarizing tool results.
///
/// # Example
/// ```ignore
/// use scribe::compression::ContextCompressor;
///
/// let compressor = ContextCompressor::builder("gpt-4o")
///     .override_limit(Some(16_000))
///     .build(basic_model)?;
///
/// let messages = compressor.compress(messages).await;
/// ```
pub struct ContextCompressor {
    summarizer: Arc<dyn CompletionModel>,
    counter: TokenCounter,
    token_limit: usize,
}

impl std::fmt::Debug for ContextCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCompressor")
            .field("model_name", &self.counter.model_name())
            .field("summarizer", &self.summarizer.model_name())
            .field("token_limit", &self.token_limit)
            .finish()
    }
}

impl ContextCompressor {
    pub fn builder(model_name: impl Into<String>) -> ContextCompressorBuilder {
        ContextCompressorBuilder {
            model_name: model_name.into(),
            override_limit: None,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    /// Compressor with the default safety margin and no override.
    pub fn new(
        model_name: impl Into<String>,
        summarizer: Arc<dyn CompletionModel>,
    ) -> Result<Self, CompressionError> {
        Self::builder(model_name).build(summarizer)
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn model_name(&self) -> &str {
        self.counter.model_name()
    }

    pub fn total_tokens(&self, messages: &[Message]) -> usize {
        self.counter.count_messages(messages).tokens
    }

    fn message_tokens(&self, message: &Message) -> usize {
        self.total_tokens(std::slice::from_ref(message))
    }

    /// Compress `messages` until they fit the token limit or nothing more
    /// can be compressed.
    ///
    /// Messages already within the limit are returned untouched. Running out
    /// of compressible messages is not an error: the list is returned over
    /// budget and the provider decides what to do with it.
    pub async fn compress(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if messages.is_empty() {
            return messages;
        }

        let mut total_tokens = self.total_tokens(&messages);
        tracing::info!(
            "Initial token count: {}, Token limit: {}",
            total_tokens,
            self.token_limit
        );

        let mut exhausted = HashSet::new();

        while total_tokens > self.token_limit {
            let Some((index, original)) =
                largest_tool_message(&messages, &self.counter, &exhausted)
            else {
                tracing::warn!(
                    "Token limit exceeded, but no compressible tool message found. \
                     The conversation history might be too long."
                );
                break;
            };

            let original_tokens = self.message_tokens(original);
            let Some(replacement) = self.summarize_at(&messages, index, original_tokens).await
            else {
                exhausted.insert(index);
                continue;
            };

            let replacement_tokens = self.message_tokens(&replacement);
            if replacement_tokens >= original_tokens {
                tracing::warn!(
                    index,
                    original_tokens,
                    replacement_tokens,
                    "Summary is not smaller than the original, keeping the original"
                );
                exhausted.insert(index);
                continue;
            }

            tracing::info!(
                "Compressing message at index {} from {} tokens to {} tokens.",
                index,
                original_tokens,
                replacement_tokens
            );
            messages[index] = replacement;

            total_tokens = self.total_tokens(&messages);
            tracing::info!("New token count: {}", total_tokens);
        }

        tracing::info!("Compression finished or was not needed.");
        messages
    }

    /// Summarize the tool message at `index` and build its replacement.
    async fn summarize_at(
        &self,
        messages: &[Message],
        index: usize,
        original_tokens: usize,
    ) -> Option<Message> {
        let Message::Tool {
            content,
            tool_call_id,
            ..
        } = &messages[index]
        else {
            return None;
        };

        let prompt = format!("{SUMMARIZATION_PROMPT}\n\n{content}");
        let summary = match self.summarizer.prompt(&prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(index, "Failed to summarize tool message: {}", e);
                return None;
            }
        };

        let tool_name = originating_tool_name(messages, index);
        Some(summary_message(tool_call_id, tool_name, original_tokens, &summary))
    }
}

/// Find the tool message with the highest token count.
///
/// Ties resolve to the earliest message. Messages counting zero tokens are
/// never selected.
pub fn find_largest_tool_message<'a>(
    messages: &'a [Message],
    counter: &TokenCounter,
) -> Option<(usize, &'a Message)> {
    largest_tool_message(messages, counter, &HashSet::new())
}

fn largest_tool_message<'a>(
    messages: &'a [Message],
    counter: &TokenCounter,
    excluded: &HashSet<usize>,
) -> Option<(usize, &'a Message)> {
    let mut largest: Option<(usize, &Message)> = None;
    let mut max_tokens = 0;

    for (index, message) in messages.iter().enumerate() {
        if !message.is_tool() || excluded.contains(&index) {
            continue;
        }
        let tokens = counter
            .count_messages(std::slice::from_ref(message))
            .tokens;
        if tokens > max_tokens {
            max_tokens = tokens;
            largest = Some((index, message));
        }
    }

    largest
}

/// Name of the tool that produced the tool message at `index`.
///
/// Uses the name recorded on the message, otherwise searches earlier
/// assistant turns for the call with the same id.
pub fn originating_tool_name(messages: &[Message], index: usize) -> Option<&str> {
    let Message::Tool {
        tool_call_id,
        tool_name,
        ..
    } = messages.get(index)?
    else {
        return None;
    };

    if let Some(name) = tool_name {
        return Some(name.as_str());
    }

    messages[..index].iter().rev().find_map(|message| match message {
        Message::Ai { tool_calls, .. } => tool_calls
            .iter()
            .find(|call| call.id == *tool_call_id)
            .map(|call| call.name.as_str()),
        _ => None,
    })
}

/// The message that replaces a summarized tool result.
pub fn summary_message(
    tool_call_id: &str,
    tool_name: Option<&str>,
    original_tokens: usize,
    summary: &str,
) -> Message {
    let call_context = tool_name
        .map(|name| format!(" (in response to `{name}` call)"))
        .unwrap_or_default();

    Message::Human {
        content: format!(
            "[Content summary from tool call `{tool_call_id}`{call_context}, \
             original length: {original_tokens} tokens]:\n{summary}"
        ),
        name: Some(SUMMARY_MESSAGE_NAME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::completion::{CompletionError, ToolCall};

    const LOCAL_MODEL: &str = "my-local-model";

    struct FakeSummarizer {
        response: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeSummarizer {
        fn replying(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionModel for FakeSummarizer {
        fn model_name(&self) -> &str {
            "fake-basic"
        }

        async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages.last().map(|m| m.content().to_string()).unwrap_or_default());
            self.response
                .clone()
                .ok_or_else(|| CompletionError::ResponseError("boom".into()))
        }
    }

    fn compressor(summarizer: Arc<FakeSummarizer>, limit: usize) -> ContextCompressor {
        ContextCompressor::builder(LOCAL_MODEL)
            .override_limit(Some(limit))
            .build(summarizer)
            .unwrap()
    }

    fn research_step(tool_chars: &[usize]) -> Vec<Message> {
        let mut messages = vec![
            Message::system("You are a researcher."),
            Message::human("Find facts about solar power."),
        ];
        for (i, chars) in tool_chars.iter().enumerate() {
            let id = format!("call_{i}");
            messages.push(Message::ai_with_tool_calls(
                "",
                vec![ToolCall::new(&id, "web_search")],
            ));
            messages.push(Message::tool(id, "x".repeat(*chars)));
        }
        messages
    }

    #[tokio::test]
    async fn test_within_budget_is_untouched() {
        let summarizer = FakeSummarizer::replying("summary");
        let compressor = compressor(summarizer.clone(), 10_000);
        let messages = research_step(&[400]);

        let result = compressor.compress(messages.clone()).await;

        assert_eq!(result, messages);
        assert!(summarizer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_messages() {
        let summarizer = FakeSummarizer::replying("summary");
        let result = compressor(summarizer.clone(), 1).compress(vec![]).await;
        assert!(result.is_empty());
        assert!(summarizer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_replaces_largest_tool_message_with_annotated_summary() {
        let summarizer = FakeSummarizer::replying("short summary");
        let compressor = compressor(summarizer.clone(), 500);
        let messages = research_step(&[4000]);

        let result = compressor.compress(messages).await;

        assert_eq!(result.len(), 4);
        let replaced = &result[3];
        assert!(!replaced.is_tool());
        assert_eq!(
            replaced,
            &summary_message("call_0", Some("web_search"), 1003, "short summary")
        );
        assert!(replaced.content().starts_with(
            "[Content summary from tool call `call_0` (in response to `web_search` call), \
             original length: 1003 tokens]:\nshort summary"
        ));
        assert!(compressor.total_tokens(&result) <= 500);
        assert_eq!(summarizer.prompts().len(), 1);
        assert!(summarizer.prompts()[0].starts_with(SUMMARIZATION_PROMPT));
    }

    #[tokio::test]
    async fn test_compresses_largest_first_until_under_budget() {
        let summarizer = FakeSummarizer::replying("short summary");
        let compressor = compressor(summarizer.clone(), 300);
        let messages = research_step(&[2000, 4000, 40]);

        let result = compressor.compress(messages).await;

        let prompts = summarizer.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].ends_with(&"x".repeat(4000)));
        assert!(prompts[1].ends_with(&"x".repeat(2000)));
        assert!(compressor.total_tokens(&result) <= 300);
        // The small tool result was never needed.
        assert!(result[7].is_tool());
    }

    #[tokio::test]
    async fn test_no_tool_messages_returns_over_budget_list() {
        let summarizer = FakeSummarizer::replying("summary");
        let compressor = compressor(summarizer.clone(), 10);
        let messages = vec![
            Message::system("system prompt ".repeat(20)),
            Message::human("question ".repeat(20)),
        ];

        let result = compressor.compress(messages.clone()).await;

        assert_eq!(result, messages);
        assert!(summarizer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_original_and_terminates() {
        let summarizer = FakeSummarizer::failing();
        let compressor = compressor(summarizer.clone(), 100);
        let messages = research_step(&[4000, 2000]);

        let result = compressor.compress(messages.clone()).await;

        assert_eq!(result, messages);
        assert_eq!(summarizer.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_summary_larger_than_original_is_rejected() {
        let summarizer = FakeSummarizer::replying(&"y".repeat(5000));
        let compressor = compressor(summarizer.clone(), 100);
        let messages = research_step(&[800]);

        let result = compressor.compress(messages.clone()).await;

        assert_eq!(result, messages);
        assert_eq!(summarizer.prompts().len(), 1);
    }

    #[test]
    fn test_find_largest_ignores_non_tool_messages_and_prefers_first_tie() {
        let counter = TokenCounter::new(LOCAL_MODEL);
        let messages = vec![
            Message::human("h".repeat(10_000)),
            Message::tool("a", "x".repeat(400)),
            Message::tool("b", "x".repeat(400)),
            Message::ai("a".repeat(10_000)),
        ];

        let (index, message) = find_largest_tool_message(&messages, &counter).unwrap();
        assert_eq!(index, 1);
        assert_eq!(message.tool_call_id(), Some("a"));

        assert!(find_largest_tool_message(&messages[..1], &counter).is_none());
    }

    #[test]
    fn test_originating_tool_name() {
        let messages = vec![
            Message::ai_with_tool_calls("", vec![ToolCall::new("c1", "crawl")]),
            Message::tool("c1", "page"),
            Message::tool_named("c2", "python_repl", "output"),
            Message::tool("c3", "orphan"),
        ];

        assert_eq!(originating_tool_name(&messages, 1), Some("crawl"));
        assert_eq!(originating_tool_name(&messages, 2), Some("python_repl"));
        assert_eq!(originating_tool_name(&messages, 3), None);
        assert_eq!(originating_tool_name(&messages, 0), None);
    }

    #[test]
    fn test_summary_message_without_tool_name() {
        let message = summary_message("c9", None, 42, "gist");
        assert_eq!(
            message.content(),
            "[Content summary from tool call `c9`, original length: 42 tokens]:\ngist"
        );
    }

    #[test]
    fn test_limit_resolution() {
        let summarizer = FakeSummarizer::replying("s");
        let compressor = ContextCompressor::new("deepseek-chat-lite", summarizer.clone()).unwrap();
        assert_eq!(compressor.token_limit(), 26_214);

        let compressor = ContextCompressor::new(LOCAL_MODEL, summarizer).unwrap();
        assert_eq!(compressor.token_limit(), 28_000);
    }

    #[test]
    fn test_construction_errors() {
        let summarizer = FakeSummarizer::replying("s");
        assert!(matches!(
            ContextCompressor::new("  ", summarizer.clone()),
            Err(CompressionError::MissingModelName)
        ));
        assert!(matches!(
            ContextCompressor::builder(LOCAL_MODEL)
                .safety_margin(0.0)
                .build(summarizer.clone()),
            Err(CompressionError::InvalidSafetyMargin(_))
        ));
        assert!(matches!(
            ContextCompressor::builder(LOCAL_MODEL)
                .safety_margin(1.5)
                .build(summarizer),
            Err(CompressionError::InvalidSafetyMargin(_))
        ));
    }
}
