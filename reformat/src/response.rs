//! Target-model execution: one prompt in, the model's answer out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ExternalServiceError;
use crate::llm::{LlmClient, Message};

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Sends a rendered prompt to the target model.
#[async_trait]
pub trait ResponseClient: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<String, ExternalServiceError>;
}

/// [`ResponseClient`] over any [`LlmClient`], with a fixed assistant system prompt.
pub struct ModelResponder {
    llm: Arc<dyn LlmClient>,
}

impl ModelResponder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ResponseClient for ModelResponder {
    async fn send(&self, prompt: &str) -> Result<String, ExternalServiceError> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let response = self.llm.invoke(&messages).await?;
        debug!(
            model = %self.llm.model(),
            prompt_chars = prompt.len(),
            response_chars = response.content.len(),
            usage = ?response.usage,
            "target response"
        );
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let llm = Arc::new(MockLlm::from_fn(|msgs| {
            assert_eq!(msgs.len(), 2);
            assert_eq!(msgs[0], Message::system(SYSTEM_PROMPT));
            Ok(format!("  echo: {}\n", msgs[1].content()))
        }));
        let responder = ModelResponder::new(llm.clone());
        assert_eq!(responder.send("hi").await.unwrap(), "echo: hi");
        assert_eq!(llm.call_count(), 1);
    }
}
