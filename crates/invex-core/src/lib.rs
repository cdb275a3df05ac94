//! Core library for invoice extraction.
//!
//! This crate provides:
//! - PDF text extraction with an OCR fallback for scanned pages
//! - Structured parsing of invoice text through a language-model oracle
//! - Tax tables and totals computed with decimal arithmetic
//! - A JSON-file invoice store with duplicate detection
//! - The upload pipeline tying these together, one file or a batch at a time

pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod store;
pub mod tax;

pub use error::{ErrorKind, InvexError, Result};
pub use invoice::{ExtractionOracle, OpenAiOracle, StructuredParser};
pub use models::config::InvexConfig;
pub use models::invoice::{DraftInvoice, InvoiceRecord, LineItem, TokenUsage};
pub use ocr::{create_engine, OcrEngine};
pub use pdf::{ExtractedText, PdfTextExtractor, TextExtractor, TextSource};
pub use pipeline::{BatchReport, FileOutcome, Pipeline, Session, Stage, UploadedFile};
pub use store::InvoiceStore;
pub use tax::{TaxTable, Totals, TotalsCalculator};
