//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the text-generation services Abacus
//! talks to (OpenAI-compatible endpoints and Ollama). The LLMProvider trait defines
//! the contract every provider implements, so the code generator, the result
//! explainer, the summarizer and the document answerer can share one abstraction
//! and tests can substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;

use crate::config::Config;

pub mod ollama;
pub mod openai;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        EngineError::Generation(err.to_string())
    }
}

/// Map a transport failure onto the provider error taxonomy
pub(crate) fn map_transport_error(err: reqwest::Error, provider: &str, base_url: &str) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout
    } else if err.is_connect() {
        LLMError::ProviderUnavailable(format!(
            "Cannot connect to {} at {}",
            provider, base_url
        ))
    } else {
        LLMError::NetworkError(err.to_string())
    }
}

/// Build the HTTP client shared by a provider
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Message sent to a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Returns the model identifier requests are sent to
    fn model(&self) -> &str;

    /// Generate a completion for a conversation
    ///
    /// # Arguments
    /// * `messages` - System prompt, history and the current request
    ///
    /// # Returns
    /// * `Ok(String)` - The completion text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Generate a completion for a single prompt
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.generate(&[Message::user(prompt)]).await
    }

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build a provider for `model` from the configured backend
///
/// # Errors
///
/// Returns `EngineError::MissingCredentials` when the OpenAI backend is
/// selected without an API key, and `EngineError::Config` for unknown
/// backends.
pub fn build_provider(config: &Config, model: &str) -> std::result::Result<Arc<dyn LLMProvider>, EngineError> {
    let timeout = Duration::from_secs(config.llm.request_timeout_secs);

    match config.llm.provider.as_str() {
        "openai" => {
            let api_key = config
                .api_key()?
                .ok_or_else(|| EngineError::MissingCredentials(crate::config::OPENAI_API_KEY_VAR.to_string()))?;
            Ok(Arc::new(openai::OpenAIProvider::new(
                &config.llm.openai_base_url,
                model,
                api_key,
                timeout,
            )))
        }
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            &config.llm.ollama_base_url,
            model,
            timeout,
        ))),
        other => Err(EngineError::Config(format!("Unknown LLM provider '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"user""#));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_llm_error_maps_to_generation() {
        let err: EngineError = LLMError::Timeout.into();
        assert!(matches!(err, EngineError::Generation(_)));
    }

    #[test]
    fn test_build_ollama_provider() {
        let mut config = Config::default();
        config.llm.provider = "ollama".to_string();
        let provider = build_provider(&config, "llama3.1:8b").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.1:8b");
    }
}
