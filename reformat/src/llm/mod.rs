//! Chat model client abstraction.
//!
//! The [`ResponseClient`](crate::response::ResponseClient) and the
//! [`LlmJudge`](crate::judge::LlmJudge) both talk to a model through [`LlmClient`]:
//! `ChatOpenAI` for OpenAI and Groq (OpenAI-compatible endpoint), `MockLlm` for tests.

mod mock;
mod openai;
mod retry;

pub use mock::MockLlm;
pub use openai::{provider_base_url, ChatOpenAI};
pub use retry::{call_with_retry, RetryPolicy, RetryableError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExternalServiceError;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// System prompt; placed first.
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System(s) | Message::User(s) | Message::Assistant(s) => s,
        }
    }
}

/// Token usage for one call, when the provider reports it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Assistant reply of one completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<LlmUsage>,
}

/// One chat completion per call. Implementations are stateless and shared via `Arc`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model name used for logging.
    fn model(&self) -> &str;

    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, ExternalServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: constructors produce the matching variant and `content` reads it back.
    #[test]
    fn message_constructors_and_content() {
        let sys = Message::system("s");
        assert!(matches!(&sys, Message::System(c) if c == "s"));
        assert_eq!(Message::user("u").content(), "u");
        assert_eq!(Message::assistant("a").content(), "a");
    }

    /// **Scenario**: messages serialize as externally tagged variants.
    #[test]
    fn message_serializes_tagged() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"User":"hi"}"#);
    }
}
