//! Fast token estimation without a tokenizer.
//!
//! Character-based approximations used when no exact tokenizer is available
//! for a model. Natural language averages roughly four characters per token.

use crate::completion::Message;

/// Characters per token for mixed natural-language text.
pub const CHARS_PER_TOKEN: f32 = 4.0;

/// Overhead tokens per message for role and formatting.
pub const MESSAGE_OVERHEAD: usize = 3;

/// Estimate token count with an explicit ratio.
///
/// Returns `None` when the ratio is not a positive finite number.
pub fn estimate_tokens_with_ratio(text: &str, chars_per_token: f32) -> Option<usize> {
    if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
        return None;
    }
    if text.is_empty() {
        return Some(0);
    }
    Some((text.chars().count() as f32 / chars_per_token).ceil() as usize)
}

/// Estimate token count for a single message, including per-message overhead.
pub fn estimate_message_tokens(message: &Message, chars_per_token: f32) -> Option<usize> {
    estimate_tokens_with_ratio(message.content(), chars_per_token)
        .map(|tokens| tokens + MESSAGE_OVERHEAD)
}

/// Estimate token count for a sequence of messages.
pub fn estimate_messages_tokens(messages: &[Message], chars_per_token: f32) -> Option<usize> {
    messages
        .iter()
        .map(|message| estimate_message_tokens(message, chars_per_token))
        .sum()
}

/// Last-resort estimate: a quarter of the character count, rounded down.
#[inline]
pub fn heuristic_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(text: &str) -> Option<usize> {
        estimate_tokens_with_ratio(text, CHARS_PER_TOKEN)
    }

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate(""), Some(0));
    }

    #[test]
    fn test_estimate_tokens_short() {
        // "hello" = 5 chars / 4.0 = 1.25 -> ceil = 2
        assert_eq!(estimate("hello"), Some(2));
    }

    #[test]
    fn test_estimate_tokens_longer() {
        let text = "a".repeat(400);
        assert_eq!(estimate(&text), Some(100));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Eight CJK characters are 24 bytes but only 8 chars.
        assert_eq!(estimate("研究人工智能应用"), Some(2));
    }

    #[test]
    fn test_invalid_ratio_is_rejected() {
        assert_eq!(estimate_tokens_with_ratio("hello", 0.0), None);
        assert_eq!(estimate_tokens_with_ratio("hello", f32::NAN), None);
    }

    #[test]
    fn test_messages_include_overhead() {
        let messages = vec![Message::human("abcd"), Message::ai("")];
        // (1 + 3) + (0 + 3)
        assert_eq!(estimate_messages_tokens(&messages, CHARS_PER_TOKEN), Some(7));
    }

    #[test]
    fn test_heuristic_rounds_down() {
        assert_eq!(heuristic_tokens("twelve chars"), 3);
        assert_eq!(heuristic_tokens("abc"), 0);
    }
}
