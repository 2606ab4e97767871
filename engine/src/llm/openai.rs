use super::{LLMError, LLMProvider, Message};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Provider for OpenAI-compatible chat completion endpoints
pub struct OpenAIProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: super::http_client(timeout),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn check_health(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.model,
            "messages": api_messages,
        });

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "OpenAI request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| super::map_transport_error(e, "OpenAI", &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else if status.is_server_error() {
                return Err(LLMError::ProviderUnavailable(format!(
                    "OpenAI API error ({}): {}",
                    status, text
                )));
            } else {
                return Err(LLMError::InvalidRequest(text));
            }
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let choice = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| LLMError::ParseError("No message in choice".to_string()))?;

        message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_properties() {
        let provider = OpenAIProvider::new(
            "https://api.openai.com/v1/",
            "gpt-4o-mini",
            "sk-test",
            Duration::from_secs(5),
        );

        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }
}
