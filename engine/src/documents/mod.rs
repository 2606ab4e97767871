//! Document collaborator
//!
//! Ingests uploaded documents (PDF or UTF-8 text), embeds their chunks, and
//! answers similarity queries for the retrieval path. Every operation degrades
//! gracefully: failures are logged and surface as empty results or failure
//! counts, never as errors to the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use sdk::errors::EngineError;
use sdk::types::{IngestReport, Passage, RawDocument};

use crate::config::DocumentsConfig;

pub mod chunker;
pub mod embedder;
pub mod pdf;

pub use chunker::TextChunker;
pub use embedder::{build_embedder, cosine_similarity, Embedder, OllamaEmbedder, OpenAIEmbedder};

/// Shown in prompts when retrieval finds nothing
pub const NO_PASSAGES_TEXT: &str = "No relevant information was found in the knowledge base.";

/// Page separator inside uploaded text
const PAGE_SEPARATOR: char = '\x0c';

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document '{0}' is not valid UTF-8 text")]
    Decode(String),

    #[error("Document '{0}' contains no text")]
    Empty(String),

    #[error("Document '{0}' is not a readable PDF: {1}")]
    Pdf(String, String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index persistence failed: {0}")]
    Persistence(String),
}

impl From<DocumentError> for EngineError {
    fn from(err: DocumentError) -> Self {
        EngineError::Retrieval(err.to_string())
    }
}

/// Collaborator used by the retrieval path
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Chunk, embed and index documents
    async fn ingest(&self, documents: Vec<RawDocument>) -> IngestReport;

    /// Most similar passages for `query`, best first
    async fn retrieve(&self, query: &str) -> Vec<Passage>;

    /// Render passages as a prompt block
    fn format(&self, passages: &[Passage]) -> String {
        format_passages(passages)
    }

    /// Number of indexed chunks
    async fn chunk_count(&self) -> usize;
}

/// Render passages as `--- Document N (Source: …, Page: …) ---` blocks
pub fn format_passages(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return NO_PASSAGES_TEXT.to_string();
    }

    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let page = passage
                .page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "--- Document {} (Source: {}, Page: {}) ---\n{}\n",
                i + 1,
                passage.source,
                page,
                passage.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedChunk {
    content: String,
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    chunks: Vec<IndexedChunk>,
}

/// In-memory vector index with optional JSON persistence
pub struct VectorDocumentStore {
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    retrieval_k: usize,
    index_path: Option<PathBuf>,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl VectorDocumentStore {
    /// Open the store, loading a persisted index when persistence is enabled
    pub async fn open(embedder: Arc<dyn Embedder>, config: &DocumentsConfig) -> Self {
        let index_path = config
            .persistence
            .then(|| config.vector_db_path.join(INDEX_FILE));

        let chunks = match &index_path {
            Some(path) => match load_index(path).await {
                Ok(chunks) => {
                    info!("Loaded {} chunk(s) from {}", chunks.len(), path.display());
                    chunks
                }
                Err(e) => {
                    warn!("Starting with an empty document index: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Self {
            embedder,
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            retrieval_k: config.retrieval_k.max(1),
            index_path,
            chunks: RwLock::new(chunks),
        }
    }

    /// Split one document into (page, chunk) pairs
    ///
    /// PDFs keep their real page numbers. Text is paged only when it contains
    /// form feeds.
    fn split_document(&self, document: &RawDocument) -> Result<Vec<(Option<u32>, String)>, DocumentError> {
        let pages: Vec<(Option<u32>, String)> = if pdf::is_pdf(&document.bytes) {
            pdf::extract_pages(&document.name, &document.bytes)?
                .into_iter()
                .map(|(number, text)| (Some(number), text))
                .collect()
        } else {
            let text = std::str::from_utf8(&document.bytes)
                .map_err(|_| DocumentError::Decode(document.name.clone()))?;
            let paged = text.contains(PAGE_SEPARATOR);
            text.split(PAGE_SEPARATOR)
                .enumerate()
                .map(|(i, page_text)| (paged.then_some(i as u32 + 1), page_text.to_string()))
                .collect()
        };

        let pieces: Vec<(Option<u32>, String)> = pages
            .iter()
            .flat_map(|(page, page_text)| {
                self.chunker
                    .split(page_text)
                    .into_iter()
                    .map(move |chunk| (*page, chunk))
            })
            .collect();

        if pieces.is_empty() {
            return Err(DocumentError::Empty(document.name.clone()));
        }
        Ok(pieces)
    }

    async fn index_document(&self, document: &RawDocument) -> Result<Vec<IndexedChunk>, DocumentError> {
        let pieces = self.split_document(document)?;
        let texts: Vec<String> = pieces.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != pieces.len() {
            return Err(DocumentError::Embedding(format!(
                "expected {} embeddings, received {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        Ok(pieces
            .into_iter()
            .zip(embeddings)
            .map(|((page, content), embedding)| IndexedChunk {
                content,
                source: document.name.clone(),
                page,
                embedding,
            })
            .collect())
    }

    async fn persist(&self, chunks: &[IndexedChunk]) -> Result<(), DocumentError> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DocumentError::Persistence(e.to_string()))?;
        }

        let index = PersistedIndex {
            version: 1,
            chunks: chunks.to_vec(),
        };
        let json = serde_json::to_vec(&index).map_err(|e| DocumentError::Persistence(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| DocumentError::Persistence(e.to_string()))?;

        debug!("Persisted {} chunk(s) to {}", chunks.len(), path.display());
        Ok(())
    }
}

async fn load_index(path: &Path) -> Result<Vec<IndexedChunk>, DocumentError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let index: PersistedIndex = serde_json::from_slice(&bytes)
                .map_err(|e| DocumentError::Persistence(format!("{}: {}", path.display(), e)))?;
            Ok(index.chunks)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(DocumentError::Persistence(format!("{}: {}", path.display(), e))),
    }
}

#[async_trait]
impl DocumentStore for VectorDocumentStore {
    async fn ingest(&self, documents: Vec<RawDocument>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut added = Vec::new();

        for (i, document) in documents.iter().enumerate() {
            match self.index_document(document).await {
                Ok(chunks) => {
                    info!(
                        "Document {} ({}) processed: {} chunk(s)",
                        i + 1,
                        document.name,
                        chunks.len()
                    );
                    report.success_count += 1;
                    report.chunk_count += chunks.len();
                    added.extend(chunks);
                }
                Err(e) => {
                    warn!("Document {} ({}) failed: {}", i + 1, document.name, e);
                    report.failure_count += 1;
                }
            }
        }

        if !added.is_empty() {
            let mut chunks = self.chunks.write().await;
            chunks.extend(added);
            if let Err(e) = self.persist(&chunks).await {
                warn!("{}", e);
            }
            info!("Document index now holds {} chunk(s)", chunks.len());
        }

        report
    }

    async fn retrieve(&self, query: &str) -> Vec<Passage> {
        let chunks = self.chunks.read().await;
        if chunks.is_empty() {
            warn!("Relevant passages requested, but the document index is empty");
            return Vec::new();
        }

        let query_embedding = match self.embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => {
                warn!("Embedder returned no vector for the query");
                return Vec::new();
            }
            Err(e) => {
                warn!("Retrieval degraded to empty context: {}", e);
                return Vec::new();
            }
        };

        let mut scored: Vec<(f32, &IndexedChunk)> = chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_embedding, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(self.retrieval_k)
            .map(|(score, chunk)| Passage {
                content: chunk.content.clone(),
                source: chunk.source.clone(),
                page: chunk.page,
                score,
            })
            .collect()
    }

    async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_empty() {
        assert_eq!(format_passages(&[]), NO_PASSAGES_TEXT);
    }

    #[test]
    fn test_format_passages() {
        let passages = vec![
            Passage {
                content: "first".to_string(),
                source: "a.txt".to_string(),
                page: Some(2),
                score: 0.9,
            },
            Passage {
                content: "second".to_string(),
                source: "b.txt".to_string(),
                page: None,
                score: 0.5,
            },
        ];
        assert_eq!(
            format_passages(&passages),
            "--- Document 1 (Source: a.txt, Page: 2) ---\nfirst\n\n--- Document 2 (Source: b.txt, Page: N/A) ---\nsecond\n"
        );
    }
}
