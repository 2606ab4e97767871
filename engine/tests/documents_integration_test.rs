//! Integration tests for the document collaborator

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Arc;
use tempfile::TempDir;

use abacus_engine::config::DocumentsConfig;
use abacus_engine::documents::{DocumentError, DocumentStore, Embedder, VectorDocumentStore};
use sdk::types::RawDocument;

const TOPICS: [&str; 3] = ["invoice", "weather", "python"];

/// Embeds text as keyword presence flags
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                TOPICS
                    .iter()
                    .map(|topic| if lower.contains(topic) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError> {
        Err(DocumentError::Embedding("service down".to_string()))
    }
}

fn config(dir: &TempDir, persistence: bool) -> DocumentsConfig {
    DocumentsConfig {
        chunk_size: 1000,
        chunk_overlap: 200,
        retrieval_k: 2,
        vector_db_path: dir.path().join("vector_db"),
        persistence,
    }
}

/// Build a small PDF with one line of Courier text per page
fn pdf_fixture(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn corpus() -> Vec<RawDocument> {
    vec![
        RawDocument::new("billing.txt", "The invoice total for March was 1200 euros."),
        RawDocument::new("forecast.txt", "Tomorrow the weather will be sunny."),
        RawDocument::new("notes.txt", "Python snippets run in a sandbox."),
    ]
}

#[tokio::test]
async fn test_ingest_and_retrieve_best_match() {
    let dir = TempDir::new().unwrap();
    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;

    let report = store.ingest(corpus()).await;
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 0);
    assert_eq!(report.chunk_count, 3);

    let passages = store.retrieve("what does the invoice say?").await;
    assert_eq!(passages.len(), 2);
    assert_eq!(passages[0].source, "billing.txt");
    assert!(passages[0].score > passages[1].score);
}

#[tokio::test]
async fn test_undecodable_and_empty_documents_fail() {
    let dir = TempDir::new().unwrap();
    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;

    let report = store
        .ingest(vec![
            RawDocument::new("binary.pdf", vec![0xffu8, 0xfe, 0x00, 0x9f]),
            RawDocument::new("blank.txt", "   \n  "),
            RawDocument::new("billing.txt", "invoice"),
        ])
        .await;

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failure_count, 2);
    assert_eq!(store.chunk_count().await, 1);
}

#[tokio::test]
async fn test_form_feed_separates_pages() {
    let dir = TempDir::new().unwrap();
    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;

    store
        .ingest(vec![RawDocument::new(
            "report.txt",
            "Intro page.\x0cThe weather section.",
        )])
        .await;

    let passages = store.retrieve("weather").await;
    assert_eq!(passages[0].page, Some(2));
    assert_eq!(passages[0].content, "The weather section.");

    let formatted = store.format(&passages[..1]);
    assert!(formatted.starts_with("--- Document 1 (Source: report.txt, Page: 2) ---"));
}

#[tokio::test]
async fn test_pdf_pages_keep_their_numbers() {
    let dir = TempDir::new().unwrap();
    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;

    let bytes = pdf_fixture(&["Quarterly invoice summary", "Weather outlook for May"]);
    let report = store.ingest(vec![RawDocument::new("annual.pdf", bytes)]).await;
    assert_eq!(report.success_count, 1);
    assert_eq!(report.chunk_count, 2);

    let passages = store.retrieve("weather").await;
    assert_eq!(passages[0].source, "annual.pdf");
    assert_eq!(passages[0].page, Some(2));
    assert!(passages[0].content.contains("Weather outlook"));

    let passages = store.retrieve("invoice").await;
    assert_eq!(passages[0].page, Some(1));
}

#[tokio::test]
async fn test_unreadable_pdf_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;

    let report = store
        .ingest(vec![RawDocument::new("broken.pdf", b"%PDF-1.4\nnot really".to_vec())])
        .await;
    assert_eq!(report.success_count, 0);
    assert_eq!(report.failure_count, 1);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, true);

    {
        let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &cfg).await;
        store.ingest(corpus()).await;
    }
    assert!(cfg.vector_db_path.join("index.json").exists());

    let reopened = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &cfg).await;
    assert_eq!(reopened.chunk_count().await, 3);
    assert_eq!(reopened.retrieve("weather today").await[0].source, "forecast.txt");
}

#[tokio::test]
async fn test_corrupt_index_starts_empty() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, true);
    std::fs::create_dir_all(&cfg.vector_db_path).unwrap();
    std::fs::write(cfg.vector_db_path.join("index.json"), "not json").unwrap();

    let store = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &cfg).await;
    assert_eq!(store.chunk_count().await, 0);
}

#[tokio::test]
async fn test_retrieval_degrades_to_empty() {
    let dir = TempDir::new().unwrap();

    let empty = VectorDocumentStore::open(Arc::new(KeywordEmbedder), &config(&dir, false)).await;
    assert!(empty.retrieve("anything").await.is_empty());

    let broken = VectorDocumentStore::open(Arc::new(BrokenEmbedder), &config(&dir, false)).await;
    let report = broken.ingest(corpus()).await;
    assert_eq!(report.failure_count, 3);
    assert!(broken.retrieve("invoice").await.is_empty());
}
