//! Best-effort token counting with an explicit fallback chain.
//!
//! Counting walks three tiers and records which one answered:
//!
//! 1. [`CountTier::Exact`]: a BPE tokenizer for the (aliased) model name.
//! 2. [`CountTier::Approximate`]: characters per token plus per-message overhead.
//! 3. [`CountTier::Heuristic`]: a quarter of the concatenated character count.
//!
//! Counting never fails. Results are estimates and must be treated as such.

use std::sync::OnceLock;

use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::{cl100k_base, o200k_base, p50k_base, r50k_base, CoreBPE};

use crate::completion::Message;

use super::estimator::{self, CHARS_PER_TOKEN};
use super::models::tokenizer_model_name;

/// Tokens added per message by chat formatting.
const TOKENS_PER_MESSAGE: usize = 3;
/// Tokens used to prime the assistant reply.
const REPLY_PRIMING_TOKENS: usize = 3;

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static R50K: OnceLock<Option<CoreBPE>> = OnceLock::new();

pub(crate) fn cl100k() -> Option<&'static CoreBPE> {
    CL100K.get_or_init(|| cl100k_base().ok()).as_ref()
}

fn bpe_for(tokenizer: Tokenizer) -> Option<&'static CoreBPE> {
    match tokenizer {
        Tokenizer::Cl100kBase => cl100k(),
        Tokenizer::O200kBase => O200K.get_or_init(|| o200k_base().ok()).as_ref(),
        Tokenizer::P50kBase => P50K.get_or_init(|| p50k_base().ok()).as_ref(),
        Tokenizer::R50kBase => R50K.get_or_init(|| r50k_base().ok()).as_ref(),
        _ => None,
    }
}

/// Which tier of the fallback chain produced a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTier {
    /// Counted with the model's BPE tokenizer.
    Exact,
    /// Estimated from characters per token, with per-message overhead.
    Approximate,
    /// Last resort: a quarter of the character count.
    Heuristic,
}

/// A token count and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    /// Number of tokens. Never negative, zero for empty input.
    pub tokens: usize,
    /// How exact `tokens` is.
    pub tier: CountTier,
}

impl TokenCount {
    fn new(tokens: usize, tier: CountTier) -> Self {
        Self { tokens, tier }
    }
}

/// Counts tokens for a named model.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    model_name: String,
    chars_per_token: f32,
}

impl TokenCounter {
    /// Counter for `model_name`. Internal model names are mapped to a
    /// tokenizer-known alias when one exists.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            chars_per_token: CHARS_PER_TOKEN,
        }
    }

    /// Override the ratio used by the approximate tier.
    ///
    /// A non-positive or non-finite ratio disables that tier.
    pub fn with_chars_per_token(mut self, chars_per_token: f32) -> Self {
        self.chars_per_token = chars_per_token;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The name the tokenizer catalogue is queried with.
    pub fn tokenizer_model(&self) -> &str {
        tokenizer_model_name(&self.model_name)
    }

    fn bpe(&self) -> Option<&'static CoreBPE> {
        get_tokenizer(self.tokenizer_model()).and_then(bpe_for)
    }

    /// Exact count for `text`, if a tokenizer is catalogued for this model.
    pub fn exact_text_tokens(&self, text: &str) -> Option<usize> {
        self.bpe()
            .map(|bpe| bpe.encode_with_special_tokens(text).len())
    }

    /// Count the tokens of a bare string, without message overhead.
    pub fn count_text(&self, text: &str) -> TokenCount {
        if let Some(tokens) = self.exact_text_tokens(text) {
            return TokenCount::new(tokens, CountTier::Exact);
        }
        tracing::trace!(model = %self.model_name, "No tokenizer for model, approximating");

        match estimator::estimate_tokens_with_ratio(text, self.chars_per_token) {
            Some(tokens) => TokenCount::new(tokens, CountTier::Approximate),
            None => TokenCount::new(estimator::heuristic_tokens(text), CountTier::Heuristic),
        }
    }

    /// Count a message list as sent to a chat model.
    ///
    /// The exact tier adds chat-format tokens per message and for the reply
    /// priming. The heuristic tier counts the contents joined by spaces.
    pub fn count_messages(&self, messages: &[Message]) -> TokenCount {
        if let Some(bpe) = self.bpe() {
            let tokens = messages
                .iter()
                .map(|message| {
                    TOKENS_PER_MESSAGE
                        + bpe.encode_with_special_tokens(message.role().as_str()).len()
                        + bpe.encode_with_special_tokens(message.content()).len()
                })
                .sum::<usize>()
                + REPLY_PRIMING_TOKENS;
            return TokenCount::new(tokens, CountTier::Exact);
        }
        tracing::trace!(model = %self.model_name, "No tokenizer for model, approximating");

        if let Some(tokens) = estimator::estimate_messages_tokens(messages, self.chars_per_token) {
            return TokenCount::new(tokens, CountTier::Approximate);
        }

        let text = messages
            .iter()
            .map(Message::content)
            .collect::<Vec<_>>()
            .join(" ");
        TokenCount::new(estimator::heuristic_tokens(&text), CountTier::Heuristic)
    }
}

/// Count tokens of `text` for `model_name`.
pub fn count_text(text: &str, model_name: &str) -> TokenCount {
    TokenCounter::new(model_name).count_text(text)
}

/// Count tokens of `messages` for `model_name`.
pub fn count_messages(messages: &[Message], model_name: &str) -> TokenCount {
    TokenCounter::new(model_name).count_messages(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_counts_exactly() {
        let count = count_text("hello world", "gpt-4");
        assert_eq!(count.tier, CountTier::Exact);
        assert_eq!(count.tokens, 2);
    }

    #[test]
    fn test_alias_reaches_the_exact_tier() {
        let count = count_text("hello world", "doubao-pro-32k");
        assert_eq!(count.tier, CountTier::Exact);
    }

    #[test]
    fn test_unknown_model_is_approximated() {
        let count = count_text("hello world", "my-local-model");
        assert_eq!(count.tier, CountTier::Approximate);
        // 11 chars / 4 -> ceil = 3
        assert_eq!(count.tokens, 3);
    }

    #[test]
    fn test_disabled_approximation_falls_to_heuristic() {
        let counter = TokenCounter::new("my-local-model").with_chars_per_token(0.0);
        let count = counter.count_text("twelve chars");
        assert_eq!(count.tier, CountTier::Heuristic);
        assert_eq!(count.tokens, 3);

        let messages = vec![Message::human("abcd"), Message::tool("c1", "efgh")];
        let count = counter.count_messages(&messages);
        assert_eq!(count.tier, CountTier::Heuristic);
        // "abcd efgh" = 9 chars -> 2
        assert_eq!(count.tokens, 2);
    }

    #[test]
    fn test_message_counts_include_overhead() {
        let counter = TokenCounter::new("my-local-model");
        let count = counter.count_messages(&[Message::human("abcd")]);
        assert_eq!(count.tier, CountTier::Approximate);
        assert_eq!(count.tokens, 4);

        let exact = TokenCounter::new("gpt-4").count_messages(&[Message::human("hello world")]);
        assert_eq!(exact.tier, CountTier::Exact);
        assert!(exact.tokens > 2);
    }

    #[test]
    fn test_empty_input_counts_as_zero_content() {
        assert_eq!(count_text("", "my-local-model").tokens, 0);
        assert_eq!(count_messages(&[], "my-local-model").tokens, 0);
    }
}
