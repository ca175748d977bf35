//! Document identity and text extraction

use crate::error::{ChunkError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

/// An ingested document: stable id, raw text, pagewise offsets.
///
/// Immutable after construction; the id is a content hash of the source
/// bytes so re-ingesting the same file always yields the same id.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    /// Byte offset where each page begins, first entry always 0
    pub page_offsets: Vec<usize>,
}

impl Document {
    /// Build a document from already-extracted text.
    pub fn from_text(source_bytes: &[u8], text: String) -> Self {
        let id = content_id(source_bytes);
        let page_offsets = page_offsets(&text);
        Self {
            id,
            text,
            page_offsets,
        }
    }

    /// Extract text from a PDF file and build a document from it.
    pub fn from_pdf(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
            warn!("PDF text extraction failed for {}: {}", path.display(), e);
            ChunkError::ExtractionFailed(e.to_string())
        })?;

        let doc = Self::from_text(&bytes, text);
        info!(
            "Extracted {} characters across {} pages from {}",
            doc.text.len(),
            doc.page_offsets.len(),
            path.display()
        );
        Ok(doc)
    }

    /// Page number (1-based) containing the given byte offset.
    pub fn page_of_offset(&self, offset: usize) -> usize {
        match self.page_offsets.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx.max(1),
        }
    }
}

/// Stable hex id over source bytes, truncated for readability.
fn content_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Page starts derived from form-feed separators in extracted text.
fn page_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    for (pos, ch) in text.char_indices() {
        if ch == '\u{c}' {
            offsets.push(pos + ch.len_utf8());
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable() {
        let a = content_id(b"some pdf bytes");
        let b = content_id(b"some pdf bytes");
        let c = content_id(b"other pdf bytes");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_page_offsets() {
        let doc = Document::from_text(b"x", "page one\u{c}page two\u{c}page three".to_string());
        assert_eq!(doc.page_offsets.len(), 3);
        assert_eq!(doc.page_of_offset(0), 1);
        assert_eq!(doc.page_of_offset(10), 2);
        assert_eq!(doc.page_of_offset(25), 3);
    }

    #[test]
    fn test_single_page_document() {
        let doc = Document::from_text(b"x", "no page breaks here".to_string());
        assert_eq!(doc.page_offsets, vec![0]);
        assert_eq!(doc.page_of_offset(5), 1);
    }
}
