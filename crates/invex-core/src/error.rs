//! Error types for the invex-core library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the invex library.
#[derive(Error, Debug)]
pub enum InvexError {
    /// Text could not be extracted from the document.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// The structured-extraction oracle failed or returned unusable data.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A line item failed boundary validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The backing store could not be read or written.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error classification reported per file by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    Parse,
    Duplicate,
    Validation,
    StorageCorrupt,
    Storage,
    Io,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Duplicate => "DuplicateError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::StorageCorrupt => "StorageCorruptError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Io => "IoError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

impl InvexError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvexError::Extraction(_) => ErrorKind::Extraction,
            InvexError::Parse(_) => ErrorKind::Parse,
            InvexError::Validation(_) => ErrorKind::Validation,
            InvexError::Store(StoreError::Corrupt { .. }) => ErrorKind::StorageCorrupt,
            InvexError::Store(StoreError::Duplicate(_)) => ErrorKind::Duplicate,
            InvexError::Store(_) => ErrorKind::Storage,
            InvexError::Io(_) => ErrorKind::Io,
            InvexError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Errors related to PDF text extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The document has content but neither the text layer nor OCR produced text.
    #[error("no text could be extracted from a non-empty document")]
    NoText,

    /// The document contains neither a text layer nor images.
    #[error("document is blank")]
    Blank,

    /// OCR was required but no engine is configured.
    #[error("document needs OCR but no OCR engine is configured")]
    OcrUnavailable,

    /// OCR engine failure.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Extraction did not finish in time.
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to read the input file.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors raised while turning text into a structured invoice.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Nothing to parse.
    #[error("no text to parse")]
    EmptyText,

    /// No API key was supplied or found in the environment.
    #[error("oracle credentials not found; set {0} or pass an API key")]
    MissingCredentials(String),

    /// The oracle could not be reached.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle answered with a non-success status.
    #[error("oracle API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The oracle did not answer in time.
    #[error("oracle request timed out")]
    Timeout,

    /// The oracle answered without content.
    #[error("empty response from oracle")]
    EmptyResponse,

    /// The response did not conform to the invoice schema.
    #[error("response does not match schema: {0}")]
    Schema(String),

    /// A line item used a category outside the vocabulary.
    #[error("line item {index} has unknown category '{category}'")]
    UnknownCategory { index: usize, category: String },
}

/// Duplicate detection failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DuplicateError {
    /// A record with this invoice id already exists.
    #[error("invoice id '{0}' already processed")]
    InvoiceId(String),

    /// A record for this filename already exists.
    #[error("file '{0}' already processed")]
    Filename(String),
}

/// A malformed line item rejected at the parser boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line item {index}: {field} {reason}")]
pub struct ValidationError {
    /// Position of the line item in the invoice.
    pub index: usize,
    /// Offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

/// Errors related to the JSON invoice store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing file exists but is not a valid store document.
    #[error("store file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Record rejected as a duplicate.
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),

    /// Serialization of the in-memory collection failed.
    #[error("failed to serialize store: {0}")]
    Serialize(serde_json::Error),

    /// Reading or writing the backing file failed.
    #[error("store I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: InvexError = ExtractionError::NoText.into();
        assert_eq!(err.kind(), ErrorKind::Extraction);

        let err: InvexError = StoreError::Duplicate(DuplicateError::Filename("a.pdf".into())).into();
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: InvexError = StoreError::Corrupt {
            path: PathBuf::from("invoices.json"),
            source,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::StorageCorrupt);
        assert_eq!(err.kind().to_string(), "StorageCorruptError");
    }
}
