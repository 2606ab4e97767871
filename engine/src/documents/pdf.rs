//! PDF text extraction

use lopdf::Document;
use tracing::{debug, warn};

use super::DocumentError;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Whether the bytes carry a PDF header
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extract the text of every page as `(page_number, text)`, 1-based.
///
/// Pages whose text cannot be decoded are skipped with a warning; a document
/// that cannot be parsed at all is an error.
pub fn extract_pages(name: &str, bytes: &[u8]) -> Result<Vec<(u32, String)>, DocumentError> {
    let document =
        Document::load_mem(bytes).map_err(|e| DocumentError::Pdf(name.to_string(), e.to_string()))?;

    if document.is_encrypted() {
        return Err(DocumentError::Pdf(name.to_string(), "document is encrypted".to_string()));
    }

    let mut pages = Vec::new();
    for number in document.get_pages().into_keys() {
        match document.extract_text(&[number]) {
            Ok(text) => pages.push((number, text)),
            Err(e) => warn!("Skipping page {} of '{}': {}", number, name, e),
        }
    }

    debug!("Extracted {} page(s) from '{}'", pages.len(), name);
    Ok(pages)
}
