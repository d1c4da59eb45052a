//! Provider trait — the abstraction over LLM completion backends.
//!
//! A Provider takes a rendered prompt (as messages) plus sampling settings
//! and returns a single text completion. It is treated as an opaque network
//! call: it may suspend and it may fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "llama3-70b-8192", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.8
}

impl ProviderRequest {
    /// A request carrying one rendered prompt as a user message.
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(prompt)],
            temperature,
            max_tokens: None,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// The completion text.
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every completion backend (Groq, OpenAI, Ollama, custom) implements this
/// trait. Stages call `complete()` without knowing which backend is in use.
/// Repeated identical requests are independent calls; nothing is cached.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "groq", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn prompt_request_wraps_a_single_user_message() {
        let req = ProviderRequest::prompt("llama3-70b-8192", "When was Ada born?", 0.8);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.messages[0].content, "When was Ada born?");
        assert!(req.max_tokens.is_none());
    }

    #[test]
    fn request_temperature_defaults_when_absent() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn response_text_is_message_content() {
        let resp = ProviderResponse {
            message: Message::assistant("1815"),
            usage: None,
            model: "m".into(),
        };
        assert_eq!(resp.text(), "1815");
    }
}
