//! Mock LLM for tests.
//!
//! Replies come from a closure over the request messages, so a test can answer
//! differently per prompt (or fail) without a network.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ExternalServiceError;
use crate::llm::{LlmClient, LlmResponse, Message};

type Responder = dyn Fn(&[Message]) -> Result<String, ExternalServiceError> + Send + Sync;

/// Scripted `LlmClient` that counts its calls.
pub struct MockLlm {
    respond: Box<Responder>,
    calls: AtomicUsize,
}

impl MockLlm {
    /// Always replies with `content`.
    pub fn with_content(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::from_fn(move |_| Ok(content.clone()))
    }

    /// Always fails with `error`.
    pub fn failing(error: ExternalServiceError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Replies with `f(messages)`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, ExternalServiceError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(f),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `invoke` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn model(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, ExternalServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = (self.respond)(messages)?;
        Ok(LlmResponse {
            content,
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_from_closure_and_counts() {
        let llm = MockLlm::from_fn(|msgs| Ok(msgs.last().map(|m| m.content().to_uppercase()).unwrap_or_default()));
        let out = llm.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out.content, "HI");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_mock_returns_error() {
        let llm = MockLlm::failing(ExternalServiceError::Network("down".into()));
        let err = llm.invoke(&[]).await.unwrap_err();
        assert_eq!(err, ExternalServiceError::Network("down".into()));
    }
}
