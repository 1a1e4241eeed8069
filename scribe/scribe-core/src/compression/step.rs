//! Per-step compression hook run before an agent calls its model.

use crate::completion::Message;
use crate::config::CompressionConfig;
use crate::providers::{AgentRole, ClientRegistry};

use super::compressor::ContextCompressor;

/// Compress an agent's messages before its next LLM call.
///
/// The compressor counts tokens for the agent's own model and summarizes with
/// the basic-tier model. `max_context_tokens` is only used as an override when
/// it differs from the default, so untouched configs follow the model's window.
///
/// Compression never blocks the step: when disabled, or when the compressor
/// cannot be built, the messages are returned unchanged.
pub async fn compress_agent_messages(
    config: &CompressionConfig,
    registry: &ClientRegistry,
    agent: AgentRole,
    messages: Vec<Message>,
) -> Vec<Message> {
    if !config.enable_context_compression {
        return messages;
    }

    let model_name = match registry.model_name_for_agent(agent) {
        Ok(model_name) => model_name,
        Err(e) => {
            tracing::warn!(%agent, "Skipping context compression: {}", e);
            return messages;
        }
    };

    let compressor = match ContextCompressor::builder(model_name)
        .override_limit(config.context_token_override())
        .build_with_registry(registry)
        .await
    {
        Ok(compressor) => compressor,
        Err(e) => {
            tracing::warn!(%agent, "Skipping context compression: {}", e);
            return messages;
        }
    };

    tracing::debug!(%agent, token_limit = compressor.token_limit(), "Compressing agent messages");
    compressor.compress(messages).await
}
