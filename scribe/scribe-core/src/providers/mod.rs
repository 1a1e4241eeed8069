//! LLM providers and the per-tier client registry.
//!
//! Agents never pick a model directly. Each [`AgentRole`] maps to an
//! [`LlmTier`], and the [`ClientRegistry`] hands out one shared client per tier.

pub mod openai;
mod registry;

use thiserror::Error;

pub use registry::{ClientFactory, ClientRegistry};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No API key configured for the {0} model")]
    MissingApiKey(LlmTier),
    #[error("No model name configured for the {0} model")]
    MissingModel(LlmTier),
    #[error("No base URL configured for the {0} model")]
    MissingBaseUrl(LlmTier),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Capability tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmTier {
    Basic,
    Reasoning,
    Vision,
}

impl LlmTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmTier::Basic => "basic",
            LlmTier::Reasoning => "reasoning",
            LlmTier::Vision => "vision",
        }
    }
}

impl std::fmt::Display for LlmTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agents of the research workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coordinator,
    Planner,
    Researcher,
    Coder,
    Reporter,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Coordinator,
        AgentRole::Planner,
        AgentRole::Researcher,
        AgentRole::Coder,
        AgentRole::Reporter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Planner => "planner",
            AgentRole::Researcher => "researcher",
            AgentRole::Coder => "coder",
            AgentRole::Reporter => "reporter",
        }
    }

    /// Tier whose model this agent runs on.
    pub fn llm_tier(&self) -> LlmTier {
        match self {
            AgentRole::Coordinator
            | AgentRole::Planner
            | AgentRole::Researcher
            | AgentRole::Coder
            | AgentRole::Reporter => LlmTier::Basic,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_agent_uses_the_basic_tier() {
        for role in AgentRole::ALL {
            assert_eq!(role.llm_tier(), LlmTier::Basic, "{role}");
        }
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LlmTier::Reasoning).unwrap(),
            "\"reasoning\""
        );
        let role: AgentRole = serde_json::from_str("\"reporter\"").unwrap();
        assert_eq!(role, AgentRole::Reporter);
    }
}
