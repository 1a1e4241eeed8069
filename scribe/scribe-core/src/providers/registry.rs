use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{openai, AgentRole, LlmTier, ProviderError};
use crate::completion::CompletionModel;
use crate::config::{ModelSettings, Settings};

/// Creates the client for a tier from its settings.
pub type ClientFactory = Arc<
    dyn Fn(LlmTier, &ModelSettings) -> Result<Arc<dyn CompletionModel>, ProviderError>
        + Send
        + Sync,
>;

/// Lazily built, shared clients keyed by [`LlmTier`].
///
/// A client is created on first use and reused afterwards, so every agent on
/// the same tier talks through the same connection pool.
pub struct ClientRegistry {
    settings: Settings,
    factory: ClientFactory,
    clients: RwLock<HashMap<LlmTier, Arc<dyn CompletionModel>>>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ClientRegistry {
    /// Registry creating OpenAI-compatible clients.
    pub fn new(settings: Settings) -> Self {
        Self::with_factory(
            settings,
            Arc::new(|tier, settings| {
                let client = openai::Client::from_settings(tier, settings)?;
                Ok(Arc::new(client) as Arc<dyn CompletionModel>)
            }),
        )
    }

    pub fn from_env() -> Self {
        Self::new(Settings::from_env())
    }

    pub fn with_factory(settings: Settings, factory: ClientFactory) -> Self {
        Self {
            settings,
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Client for `tier`, created on first request.
    pub async fn get(&self, tier: LlmTier) -> Result<Arc<dyn CompletionModel>, ProviderError> {
        if let Some(client) = self.clients.read().await.get(&tier) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(&tier) {
            return Ok(client.clone());
        }

        let client = (self.factory)(tier, self.settings.for_tier(tier))?;
        tracing::debug!(%tier, model = client.model_name(), "Created LLM client");
        clients.insert(tier, client.clone());
        Ok(client)
    }

    /// Client for the tier `role` runs on.
    pub async fn get_for_agent(
        &self,
        role: AgentRole,
    ) -> Result<Arc<dyn CompletionModel>, ProviderError> {
        self.get(role.llm_tier()).await
    }

    /// Register a prebuilt client, replacing any cached one.
    pub async fn insert(&self, tier: LlmTier, client: Arc<dyn CompletionModel>) {
        self.clients.write().await.insert(tier, client);
    }

    /// Drop all cached clients. The next [`ClientRegistry::get`] rebuilds them.
    pub async fn clear(&self) {
        self.clients.write().await.clear();
    }

    /// Configured model name for the tier `role` runs on.
    pub fn model_name_for_agent(&self, role: AgentRole) -> Result<String, ProviderError> {
        let tier = role.llm_tier();
        self.settings
            .for_tier(tier)
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .ok_or(ProviderError::MissingModel(tier))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::completion::{CompletionError, Message};

    struct Named(String);

    #[async_trait]
    impl CompletionModel for Named {
        fn model_name(&self) -> &str {
            &self.0
        }

        async fn complete(&self, _messages: &[Message]) -> Result<String, CompletionError> {
            Ok(String::new())
        }
    }

    fn counting_registry(created: Arc<AtomicUsize>) -> ClientRegistry {
        ClientRegistry::with_factory(
            Settings::default(),
            Arc::new(move |tier, settings| {
                created.fetch_add(1, Ordering::SeqCst);
                let model = settings.model.clone().unwrap_or_else(|| tier.to_string());
                Ok(Arc::new(Named(model)) as Arc<dyn CompletionModel>)
            }),
        )
    }

    #[tokio::test]
    async fn test_clients_are_created_once_per_tier() {
        let created = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(created.clone());

        let first = registry.get(LlmTier::Basic).await.unwrap();
        let second = registry.get_for_agent(AgentRole::Reporter).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.model_name(), "doubao-1-5-pro-32k-250115");

        registry.get(LlmTier::Vision).await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);

        registry.clear().await;
        registry.get(LlmTier::Basic).await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_inserted_client_wins() {
        let created = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(created.clone());

        registry
            .insert(LlmTier::Basic, Arc::new(Named("stub".into())))
            .await;
        let client = registry.get(LlmTier::Basic).await.unwrap();
        assert_eq!(client.model_name(), "stub");
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_default_factory_requires_an_api_key() {
        let registry = ClientRegistry::new(Settings::default());
        let result = registry.get(LlmTier::Basic).await;
        assert!(matches!(
            result,
            Err(ProviderError::MissingApiKey(LlmTier::Basic))
        ));
    }

    #[test]
    fn test_model_name_for_agent_reads_tier_settings() {
        let registry = ClientRegistry::new(Settings::default());
        assert_eq!(
            registry.model_name_for_agent(AgentRole::Researcher).unwrap(),
            "doubao-1-5-pro-32k-250115"
        );

        let mut settings = Settings::default();
        settings.basic_model.model = None;
        let registry = ClientRegistry::new(settings);
        assert!(matches!(
            registry.model_name_for_agent(AgentRole::Coder),
            Err(ProviderError::MissingModel(LlmTier::Basic))
        ));
    }
}
