//! Configuration for compression and for the LLM tiers.
//!
//! [`CompressionConfig`] carries the per-request knobs (token budgets, chunking,
//! second pass). It loads from TOML or from a loosely typed "configurable" JSON
//! map where missing, null or zero values fall back to defaults.
//! [`Settings`] describes how to reach each LLM tier and is read from
//! environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::providers::LlmTier;

/// Default per-agent context ceiling. Only a different value is treated as an
/// explicit override.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 32_000;
pub const DEFAULT_MAX_OBSERVATIONS_TOKENS: usize = 45_000;
pub const DEFAULT_COMPRESSION_SAFETY_MARGIN: f64 = 0.8;
pub const DEFAULT_SUMMARIZER_CHUNK_SIZE: usize = 8_000;
pub const DEFAULT_SUMMARIZER_CHUNK_OVERLAP: usize = 400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configurable value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress agent-step messages before each LLM call.
    pub enable_context_compression: bool,
    /// Per-agent token ceiling for [`ContextCompressor`](crate::compression::ContextCompressor).
    pub max_context_tokens: usize,
    /// Observation budget before the report is written.
    pub max_observations_tokens: usize,
    /// Fraction of `max_observations_tokens` observations may use, in (0, 1].
    pub compression_safety_margin: f64,
    /// Chunk size in tokens for the map phase.
    pub summarizer_chunk_size: usize,
    /// Tokens shared by neighbouring chunks. Must be below the chunk size.
    pub summarizer_chunk_overlap: usize,
    /// Consolidate chunk summaries with a second LLM pass when they are still large.
    pub summarizer_enable_second_pass: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enable_context_compression: true,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_observations_tokens: DEFAULT_MAX_OBSERVATIONS_TOKENS,
            compression_safety_margin: DEFAULT_COMPRESSION_SAFETY_MARGIN,
            summarizer_chunk_size: DEFAULT_SUMMARIZER_CHUNK_SIZE,
            summarizer_chunk_overlap: DEFAULT_SUMMARIZER_CHUNK_OVERLAP,
            summarizer_enable_second_pass: true,
        }
    }
}

impl CompressionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Build from a runnable config of the shape `{"configurable": {...}}`.
    ///
    /// Numeric values that are missing, null or zero use the default.
    /// Booleans only fall back when missing or null.
    pub fn from_configurable(config: &Value) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let configurable = match config.get("configurable") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Default::default(),
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "configurable must be an object, got {other}"
                )))
            }
        };

        let number = |key: &str, default: usize| -> Result<usize, ConfigError> {
            match configurable.get(key) {
                None | Some(Value::Null) => Ok(default),
                Some(value) => {
                    let parsed: usize = serde_json::from_value(value.clone())?;
                    Ok(if parsed == 0 { default } else { parsed })
                }
            }
        };
        let boolean = |key: &str, default: bool| -> Result<bool, ConfigError> {
            match configurable.get(key) {
                None | Some(Value::Null) => Ok(default),
                Some(value) => Ok(serde_json::from_value(value.clone())?),
            }
        };

        let safety_margin = match configurable.get("compression_safety_margin") {
            None | Some(Value::Null) => defaults.compression_safety_margin,
            Some(value) => {
                let parsed: f64 = serde_json::from_value(value.clone())?;
                if parsed == 0.0 {
                    defaults.compression_safety_margin
                } else {
                    parsed
                }
            }
        };

        let config = Self {
            enable_context_compression: boolean(
                "enable_context_compression",
                defaults.enable_context_compression,
            )?,
            max_context_tokens: number("max_context_tokens", defaults.max_context_tokens)?,
            max_observations_tokens: number(
                "max_observations_tokens",
                defaults.max_observations_tokens,
            )?,
            compression_safety_margin: safety_margin,
            summarizer_chunk_size: number("summarizer_chunk_size", defaults.summarizer_chunk_size)?,
            summarizer_chunk_overlap: number(
                "summarizer_chunk_overlap",
                defaults.summarizer_chunk_overlap,
            )?,
            summarizer_enable_second_pass: boolean(
                "summarizer_enable_second_pass",
                defaults.summarizer_enable_second_pass,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !(self.compression_safety_margin > 0.0 && self.compression_safety_margin <= 1.0) {
            errors.push("compression_safety_margin must be in (0, 1]");
        }
        if self.max_observations_tokens == 0 {
            errors.push("max_observations_tokens must be greater than 0");
        }
        if self.max_context_tokens == 0 {
            errors.push("max_context_tokens must be greater than 0");
        }
        if self.summarizer_chunk_size == 0 {
            errors.push("summarizer_chunk_size must be greater than 0");
        }
        if self.summarizer_chunk_overlap >= self.summarizer_chunk_size {
            errors.push("summarizer_chunk_overlap must be less than summarizer_chunk_size");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    /// The per-agent override for the compressor, if one was configured.
    pub fn context_token_override(&self) -> Option<usize> {
        (self.max_context_tokens != DEFAULT_MAX_CONTEXT_TOKENS).then_some(self.max_context_tokens)
    }
}

/// Connection settings for one LLM tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub verify_ssl: bool,
}

impl ModelSettings {
    fn from_lookup<F>(prefix: &str, lookup: &F, defaults: ModelSettings) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{prefix}{name}")).filter(|v| !v.is_empty());

        Self {
            base_url: var("BASE_URL").or(defaults.base_url),
            model: var("MODEL").or(defaults.model),
            api_key: var("API_KEY").or(defaults.api_key),
            verify_ssl: var("VERIFY_SSL")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }
}

/// Settings for every LLM tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub basic_model: ModelSettings,
    pub reasoning_model: ModelSettings,
    pub vision_model: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            basic_model: basic_defaults(),
            reasoning_model: ModelSettings {
                verify_ssl: true,
                ..Default::default()
            },
            vision_model: ModelSettings {
                verify_ssl: true,
                ..Default::default()
            },
        }
    }
}

fn basic_defaults() -> ModelSettings {
    ModelSettings {
        base_url: Some("https://ark.cn-beijing.volces.com/api/v3".into()),
        model: Some("doubao-1-5-pro-32k-250115".into()),
        api_key: None,
        verify_ssl: true,
    }
}

impl Settings {
    /// Read `BASIC_MODEL_*`, `REASONING_MODEL_*` and `VISION_MODEL_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Settings::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            basic_model: ModelSettings::from_lookup("BASIC_MODEL_", &lookup, basic_defaults()),
            reasoning_model: ModelSettings::from_lookup(
                "REASONING_MODEL_",
                &lookup,
                ModelSettings::default(),
            ),
            vision_model: ModelSettings::from_lookup(
                "VISION_MODEL_",
                &lookup,
                ModelSettings::default(),
            ),
        }
    }

    pub fn for_tier(&self, tier: LlmTier) -> &ModelSettings {
        match tier {
            LlmTier::Basic => &self.basic_model,
            LlmTier::Reasoning => &self.reasoning_model,
            LlmTier::Vision => &self.vision_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_fs::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CompressionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_observations_tokens, 45_000);
        assert_eq!(config.context_token_override(), None);
    }

    #[test]
    fn test_toml_overrides_some_fields() {
        let config = CompressionConfig::from_toml_str(
            r#"
            max_observations_tokens = 120000
            summarizer_enable_second_pass = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_observations_tokens, 120_000);
        assert!(!config.summarizer_enable_second_pass);
        assert_eq!(config.summarizer_chunk_size, DEFAULT_SUMMARIZER_CHUNK_SIZE);
    }

    #[test]
    fn test_invalid_values_are_reported_together() {
        let err = CompressionConfig::from_toml_str(
            r#"
            compression_safety_margin = 1.5
            summarizer_chunk_size = 100
            summarizer_chunk_overlap = 100
            "#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("compression_safety_margin"));
        assert!(message.contains("summarizer_chunk_overlap"));
    }

    #[test]
    fn test_load_reads_file_or_defaults() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("scribe.toml");
        file.write_str("max_context_tokens = 16000\n").unwrap();

        let config = CompressionConfig::load(file.path()).unwrap();
        assert_eq!(config.max_context_tokens, 16_000);
        assert_eq!(config.context_token_override(), Some(16_000));

        let missing = CompressionConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(missing, CompressionConfig::default());
    }

    #[test]
    fn test_configurable_zero_and_null_fall_back() {
        let config = CompressionConfig::from_configurable(&json!({
            "configurable": {
                "max_observations_tokens": 0,
                "summarizer_chunk_size": null,
                "compression_safety_margin": 0.5,
                "summarizer_enable_second_pass": false,
            }
        }))
        .unwrap();

        assert_eq!(config.max_observations_tokens, DEFAULT_MAX_OBSERVATIONS_TOKENS);
        assert_eq!(config.summarizer_chunk_size, DEFAULT_SUMMARIZER_CHUNK_SIZE);
        assert_eq!(config.compression_safety_margin, 0.5);
        assert!(!config.summarizer_enable_second_pass);

        let empty = CompressionConfig::from_configurable(&json!({})).unwrap();
        assert_eq!(empty, CompressionConfig::default());
    }

    #[test]
    fn test_configurable_rejects_wrong_types() {
        assert!(CompressionConfig::from_configurable(&json!({"configurable": []})).is_err());
        assert!(CompressionConfig::from_configurable(&json!({
            "configurable": {"summarizer_chunk_size": "big"}
        }))
        .is_err());
    }

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BASIC_MODEL_API_KEY", "sk-basic"),
            ("REASONING_MODEL_MODEL", "deepseek-reasoner"),
            ("REASONING_MODEL_VERIFY_SSL", "false"),
        ]);
        let settings = Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.basic_model.api_key.as_deref(), Some("sk-basic"));
        assert_eq!(
            settings.basic_model.model.as_deref(),
            Some("doubao-1-5-pro-32k-250115")
        );
        assert!(settings.basic_model.verify_ssl);
        assert_eq!(
            settings.for_tier(LlmTier::Reasoning).model.as_deref(),
            Some("deepseek-reasoner")
        );
        assert!(!settings.reasoning_model.verify_ssl);
        assert_eq!(settings.vision_model.api_key, None);
    }
}
