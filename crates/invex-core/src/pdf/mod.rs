//! PDF processing module.

mod extractor;

pub use extractor::{PdfDocument, PdfTextExtractor};

use std::path::Path;

use crate::error::ExtractionError;

/// Where the extracted text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Embedded text layer.
    TextLayer,
    /// OCR of page images.
    Ocr,
    /// The document has neither text nor images.
    Blank,
}

/// Text extracted from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    /// Page texts joined in page order.
    pub text: String,
    /// Which path produced the text.
    pub source: TextSource,
    /// Number of pages in the document.
    pub page_count: u32,
}

impl ExtractedText {
    /// A genuinely blank document, as opposed to a failed extraction.
    pub fn is_blank(&self) -> bool {
        self.source == TextSource::Blank
    }
}

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Trait for document-to-text extraction.
pub trait TextExtractor: Send + Sync {
    /// Extract text from in-memory PDF bytes.
    fn extract_bytes(&self, data: &[u8]) -> Result<ExtractedText>;

    /// Extract text from a PDF on disk.
    fn extract_file(&self, path: &Path) -> Result<ExtractedText> {
        let data = std::fs::read(path)?;
        self.extract_bytes(&data)
    }
}

/// Count of non-whitespace characters, used to judge whether text is usable.
pub(crate) fn meaningful_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
