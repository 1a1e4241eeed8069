//! Model catalogue: tokenizer aliases and context-window sizes.

use tiktoken_rs::model::get_context_size;
use tiktoken_rs::tokenizer::get_tokenizer;

/// Context window used when nothing else resolves a model.
pub const DEFAULT_TOKEN_LIMIT: usize = 28_000;

/// Default fraction of a model's window the compressor may fill.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.8;

/// Internal model identifiers mapped to a tokenizer-compatible equivalent of
/// similar size. Names not listed here pass through unchanged.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("doubao-1-5-pro-32k-250115", "gpt-3.5-turbo"),
    ("doubao-pro-4k", "gpt-3.5-turbo"),
    ("doubao-pro-32k", "gpt-3.5-turbo"),
    ("doubao-pro-128k", "gpt-4-turbo"),
];

/// Context windows for models the tokenizer library does not catalogue.
const DEFAULT_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("deepseek-chat", 65_536),
    ("deepseek-chat-lite", 32_768),
    ("deepseek-v2", 128_000),
    ("doubao-1-5-pro-32k-250115", 32_000),
    ("doubao-pro-4k", 4_000),
    ("doubao-pro-32k", 32_000),
    ("doubao-pro-128k", 128_000),
];

/// Translate an internal model name to the name the tokenizer knows it by.
pub fn tokenizer_model_name(model_name: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model_name)
        .map(|(_, target)| *target)
        .unwrap_or(model_name)
}

/// Context window reported by the tokenizer catalogue, if the model is known to it.
pub fn catalogued_context_window(model_name: &str) -> Option<usize> {
    let resolved = tokenizer_model_name(model_name);
    get_tokenizer(resolved)?;
    Some(get_context_size(resolved))
}

/// Context window from the hard-coded fallback table.
pub fn default_context_window(model_name: &str) -> Option<usize> {
    DEFAULT_CONTEXT_WINDOWS
        .iter()
        .find(|(name, _)| *name == model_name)
        .map(|(_, window)| *window)
}

/// Where a resolved token limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSource {
    Override,
    Tokenizer,
    DefaultTable,
    GlobalDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimit {
    pub tokens: usize,
    pub source: LimitSource,
}

/// Resolve the token ceiling for `model_name`.
///
/// Order: explicit override, tokenizer catalogue scaled by `safety_margin`,
/// default window table scaled by `safety_margin`, then [`DEFAULT_TOKEN_LIMIT`].
/// The global default is not scaled.
pub fn resolve_token_limit(
    model_name: &str,
    override_limit: Option<usize>,
    safety_margin: f64,
) -> TokenLimit {
    if let Some(tokens) = override_limit.filter(|limit| *limit > 0) {
        tracing::info!(tokens, "Using override token limit");
        return TokenLimit {
            tokens,
            source: LimitSource::Override,
        };
    }

    if let Some(window) = catalogued_context_window(model_name) {
        let tokens = scale(window, safety_margin);
        tracing::info!(
            "Model '{}' (mapped to '{}') max tokens: {}. Using {}% safety margin -> limit: {}",
            model_name,
            tokenizer_model_name(model_name),
            window,
            safety_margin * 100.0,
            tokens
        );
        return TokenLimit {
            tokens,
            source: LimitSource::Tokenizer,
        };
    }

    if let Some(window) = default_context_window(model_name) {
        let tokens = scale(window, safety_margin);
        tracing::info!(
            "Using predefined context window for '{}': {} tokens. Using {}% safety margin -> limit: {}",
            model_name,
            window,
            safety_margin * 100.0,
            tokens
        );
        return TokenLimit {
            tokens,
            source: LimitSource::DefaultTable,
        };
    }

    tracing::warn!(
        "Could not determine max tokens for model '{}'. Defaulting to {} tokens.",
        model_name,
        DEFAULT_TOKEN_LIMIT
    );
    TokenLimit {
        tokens: DEFAULT_TOKEN_LIMIT,
        source: LimitSource::GlobalDefault,
    }
}

fn scale(window: usize, safety_margin: f64) -> usize {
    (window as f64 * safety_margin).floor() as usize
}
