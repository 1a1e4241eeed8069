use async_trait::async_trait;
use http::{header, HeaderMap, HeaderValue};

use super::completion::{ChatMessage, ChatRequest, ChatResponse, ErrorResponse};
use crate::completion::{CompletionError, CompletionModel, Message};
use crate::config::ModelSettings;
use crate::providers::{LlmTier, ProviderError};
use crate::tokens::TokenCounter;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ClientBuilder {
    api_key: String,
    model: String,
    base_url: String,
    verify_ssl: bool,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Accept invalid TLS certificates when `false`.
    pub fn verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Use a preconfigured HTTP client. Headers are still added per request.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<Client, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let http_client = match self.http_client {
            Some(client) => client,
            None => http_builder(self.verify_ssl).build()?,
        };

        Ok(Client {
            http_client,
            headers,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            counter: TokenCounter::new(self.model.clone()),
            model: self.model,
        })
    }
}

#[cfg(any(feature = "reqwest-tls", feature = "reqwest-rustls"))]
fn http_builder(verify_ssl: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder().danger_accept_invalid_certs(!verify_ssl)
}

#[cfg(not(any(feature = "reqwest-tls", feature = "reqwest-rustls")))]
fn http_builder(_verify_ssl: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
}

/// Chat-completions client bound to one model.
#[derive(Clone)]
pub struct Client {
    http_client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    model: String,
    counter: TokenCounter,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("headers", &"<redacted>")
            .finish()
    }
}

impl Client {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            verify_ssl: true,
            http_client: None,
        }
    }

    /// Build the client for `tier` from its settings.
    ///
    /// An API key and a model are always required. The reasoning tier must
    /// also configure its endpoint; the other tiers fall back to
    /// [`DEFAULT_BASE_URL`].
    pub fn from_settings(tier: LlmTier, settings: &ModelSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ProviderError::MissingApiKey(tier))?;
        let model = settings
            .model
            .as_deref()
            .filter(|model| !model.is_empty())
            .ok_or(ProviderError::MissingModel(tier))?;
        let base_url = match settings.base_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => url,
            None if tier == LlmTier::Reasoning => {
                return Err(ProviderError::MissingBaseUrl(tier));
            }
            None => DEFAULT_BASE_URL,
        };

        Self::builder(api_key, model)
            .base_url(base_url)
            .verify_ssl(settings.verify_ssl)
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionModel for Client {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(ChatMessage::from).collect(),
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error.message)
                .unwrap_or(body);
            return Err(CompletionError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }

        let response: ChatResponse = response.json().await?;
        response.into_text()
    }

    fn count_tokens(&self, text: &str) -> Result<usize, CompletionError> {
        self.counter
            .exact_text_tokens(text)
            .ok_or_else(|| CompletionError::TokenCountUnsupported(self.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ModelSettings {
        ModelSettings {
            base_url: Some("https://api.deepseek.com/v1/".into()),
            model: Some("deepseek-chat".into()),
            api_key: Some("sk-test".into()),
            verify_ssl: true,
        }
    }

    #[test]
    fn test_from_settings_builds_endpoint() {
        let client = Client::from_settings(LlmTier::Reasoning, &settings()).unwrap();
        assert_eq!(client.model_name(), "deepseek-chat");
        assert_eq!(
            client.endpoint(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_settings_reports_missing_fields() {
        let mut no_key = settings();
        no_key.api_key = None;
        assert!(matches!(
            Client::from_settings(LlmTier::Basic, &no_key),
            Err(ProviderError::MissingApiKey(LlmTier::Basic))
        ));

        let mut no_url = settings();
        no_url.base_url = Some(String::new());
        assert!(matches!(
            Client::from_settings(LlmTier::Reasoning, &no_url),
            Err(ProviderError::MissingBaseUrl(LlmTier::Reasoning))
        ));

        let mut no_model = settings();
        no_model.model = None;
        assert!(matches!(
            Client::from_settings(LlmTier::Vision, &no_model),
            Err(ProviderError::MissingModel(LlmTier::Vision))
        ));
    }

    #[test]
    fn test_from_settings_defaults_base_url_outside_reasoning() {
        let mut no_url = settings();
        no_url.base_url = None;
        no_url.model = Some("gpt-4o".into());

        let vision = Client::from_settings(LlmTier::Vision, &no_url).unwrap();
        assert_eq!(vision.base_url(), DEFAULT_BASE_URL);
        assert_eq!(
            vision.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );

        let basic = Client::from_settings(LlmTier::Basic, &no_url).unwrap();
        assert_eq!(basic.base_url(), DEFAULT_BASE_URL);

        assert!(matches!(
            Client::from_settings(LlmTier::Reasoning, &no_url),
            Err(ProviderError::MissingBaseUrl(LlmTier::Reasoning))
        ));
    }

    #[test]
    fn test_count_tokens_depends_on_tokenizer() {
        let gpt = Client::builder("sk", "gpt-4").build().unwrap();
        assert_eq!(gpt.count_tokens("hello world").unwrap(), 2);

        let local = Client::builder("sk", "my-local-model").build().unwrap();
        assert!(matches!(
            local.count_tokens("hello"),
            Err(CompletionError::TokenCountUnsupported(_))
        ));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client = Client::builder("sk-secret", "gpt-4").build().unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
