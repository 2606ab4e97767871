//! Embedding providers
//!
//! Embeddings come from the same backend as text generation: OpenAI-compatible
//! `/embeddings` or Ollama `/api/embeddings`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;

use super::DocumentError;
use crate::config::Config;
use crate::llm::http_client;

/// Turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed each text; the output has one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError>;
}

/// OpenAI-compatible embeddings endpoint
pub struct OpenAIEmbedder {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
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
            client: http_client(timeout),
        }
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| DocumentError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DocumentError::Embedding(format!(
                "OpenAI embeddings error ({}): {}",
                status, text
            )));
        }

        let mut body: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DocumentError::Embedding(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(DocumentError::Embedding(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Ollama embeddings endpoint (one request per text)
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: http_client(timeout),
        }
    }
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut vectors = Vec::with_capacity(texts.len());

        for text in texts {
            let response = self
                .client
                .post(&url)
                .json(&json!({ "model": self.model, "prompt": text }))
                .send()
                .await
                .map_err(|e| DocumentError::Embedding(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(DocumentError::Embedding(format!(
                    "Ollama embeddings error ({}): {}",
                    status, body
                )));
            }

            let body: OllamaEmbeddingResponse = response
                .json()
                .await
                .map_err(|e| DocumentError::Embedding(e.to_string()))?;
            vectors.push(body.embedding);
        }

        Ok(vectors)
    }
}

/// Build the embedder for the configured backend
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, EngineError> {
    let timeout = Duration::from_secs(config.llm.request_timeout_secs);

    match config.llm.provider.as_str() {
        "openai" => {
            let api_key = config.api_key()?.unwrap_or_default();
            Ok(Arc::new(OpenAIEmbedder::new(
                &config.llm.openai_base_url,
                &config.llm.embedding_model,
                api_key,
                timeout,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            &config.llm.ollama_base_url,
            &config.llm.embedding_model,
            timeout,
        ))),
        other => Err(EngineError::Config(format!("Unknown LLM provider '{}'", other))),
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
