//! OpenAI Chat Completions client implementing `LlmClient` (ChatOpenAI).
//!
//! Talks to any OpenAI-compatible endpoint. Groq models go to
//! `https://api.groq.com/openai/v1` (or `GROQ_BASE_URL`), OpenAI models to
//! `https://api.openai.com/v1` (or `OPENAI_BASE_URL`). API errors are classified into
//! [`ExternalServiceError`] so the retry policy can tell auth failures from transient ones.

use async_trait::async_trait;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};

use crate::catalog::{ModelId, Provider};
use crate::error::ExternalServiceError;
use crate::llm::{LlmClient, LlmResponse, LlmUsage, Message};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";

/// Base URL for `provider`: the `*_BASE_URL` override when set, else the public endpoint.
pub fn provider_base_url(provider: Provider) -> String {
    let (var, default) = match provider {
        Provider::OpenAi => ("OPENAI_BASE_URL", OPENAI_BASE),
        Provider::Groq => ("GROQ_BASE_URL", GROQ_BASE),
    };
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Chat completions client.
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    base_url: String,
}

impl ChatOpenAI {
    /// Build client with custom config (API key and base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        let base_url = config_base(&config);
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
            base_url,
        }
    }

    /// Client for a catalog model: provider endpoint, provider API model name.
    pub fn for_model(model: ModelId, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(provider_base_url(model.provider()));
        Self::with_config(config, model.api_model())
    }

    /// Set temperature (0–2). Lower values are more deterministic.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }
}

fn config_base(config: &OpenAIConfig) -> String {
    use async_openai::config::Config;
    config.api_base().to_string()
}

/// Maps a provider error onto the retry taxonomy.
fn map_error(e: OpenAIError) -> ExternalServiceError {
    match e {
        OpenAIError::ApiError(api) => classify(api.code.as_deref(), &api.message),
        other => classify(None, &other.to_string()),
    }
}

fn classify(code: Option<&str>, message: &str) -> ExternalServiceError {
    let lower = message.to_lowercase();
    let code = code.unwrap_or_default().to_lowercase();
    if code == "invalid_api_key"
        || lower.contains("invalid api key")
        || lower.contains("incorrect api key")
        || lower.contains("unauthorized")
        || lower.contains("401")
    {
        ExternalServiceError::Auth(message.to_string())
    } else if code == "rate_limit_exceeded" || lower.contains("rate limit") || lower.contains("429")
    {
        ExternalServiceError::RateLimited(message.to_string())
    } else if lower.contains("error sending request")
        || lower.contains("connection")
        || lower.contains("dns")
    {
        ExternalServiceError::Network(message.to_string())
    } else {
        ExternalServiceError::Api(message.to_string())
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, ExternalServiceError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| ExternalServiceError::Api(format!("request build failed: {}", e)))?;

        debug!(
            url = %self.base_url,
            model = %self.model,
            message_count = messages.len(),
            temperature = ?self.temperature,
            "chat create"
        );
        if let Ok(js) = serde_json::to_string_pretty(&request) {
            trace!(model = %self.model, request = %js, "chat request body");
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_error)?;

        let usage = response.usage.as_ref().map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExternalServiceError::Api("provider returned no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        trace!(model = %self.model, content = %content, "chat response");
        Ok(LlmResponse { content, usage })
    }
}
