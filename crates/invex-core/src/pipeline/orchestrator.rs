//! Drives one upload through duplicate check, extraction, parsing and storage.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::{
    upload_name, BatchReport, FailedFile, FileOutcome, ProcessedInvoice, Session, SkippedFile, Stage,
    UploadedFile,
};
use crate::error::{ExtractionError, InvexError, StoreError};
use crate::invoice::{OpenAiOracle, StructuredParser};
use crate::models::config::InvexConfig;
use crate::models::invoice::InvoiceRecord;
use crate::ocr::create_engine;
use crate::pdf::{ExtractedText, PdfTextExtractor, TextExtractor};

/// Per-file pipeline: extractor, parser and the extraction time limit.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    parser: StructuredParser,
    extraction_timeout: Duration,
}

impl Pipeline {
    pub fn new(extractor: Arc<dyn TextExtractor>, parser: StructuredParser) -> Self {
        Self {
            extractor,
            parser,
            extraction_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    /// Build the PDF extractor (with OCR when available) and the chat
    /// completions parser described by `config`.
    pub fn from_config(config: &InvexConfig, api_key: Option<String>) -> crate::Result<Self> {
        let mut extractor = PdfTextExtractor::new(config.pdf.clone());
        match create_engine(&config.ocr) {
            Ok(Some(engine)) => {
                extractor = extractor.with_ocr(engine, config.ocr.clone());
            }
            Ok(None) => debug!("OCR fallback not available"),
            Err(e) => warn!("Failed to load OCR engine, continuing without OCR: {}", e),
        }

        let oracle = OpenAiOracle::new(&config.oracle, api_key)?;
        let parser = StructuredParser::new(Arc::new(oracle))
            .with_policy(config.tax.unknown_category_policy)
            .with_max_input_chars(config.oracle.max_input_chars);

        Ok(Self::new(Arc::new(extractor), parser)
            .with_extraction_timeout(Duration::from_secs(config.pdf.timeout_secs)))
    }

    /// Process one upload. Failures are reported in the outcome, never stored.
    pub async fn process_single(&self, session: &Session, upload: UploadedFile) -> FileOutcome {
        let filename = upload.name.clone();
        info!("Received {} ({} bytes)", filename, upload.data.len());

        if session.store().await.is_processed(&filename, "") {
            info!("Skipping {}: already processed", filename);
            return FileOutcome::Skipped(SkippedFile {
                filename,
                stage: Stage::DuplicateCheck,
                reason: "file already processed".to_string(),
            });
        }

        let extracted = match self.extract(upload).await {
            Ok(extracted) => extracted,
            Err(e) => return failed(&filename, Stage::Extracting, e),
        };
        debug!(
            "Extracted {} chars from {} page(s) of {} via {:?}",
            extracted.text.len(),
            extracted.page_count,
            filename,
            extracted.source
        );

        let draft = match self.parser.parse(&extracted.text, session.tax_table()).await {
            Ok(draft) => draft,
            Err(e) => return failed(&filename, Stage::Parsing, e),
        };

        let record = match InvoiceRecord::new(draft, filename.as_str(), session.tax_table(), Utc::now()) {
            Ok(record) => record,
            Err(e) => return failed(&filename, Stage::TotalsComputed, e.into()),
        };
        debug!(
            "Totals for {}: pre-tax {}, tax {}, post-tax {}",
            filename,
            record.pre_tax_total(),
            record.tax_total(),
            record.post_tax_total()
        );

        match session.store().await.add(record.clone()) {
            Ok(()) => {
                info!(
                    "Stored invoice '{}' from {} (total {})",
                    record.invoice_id(),
                    filename,
                    record.post_tax_total()
                );
                FileOutcome::Done(ProcessedInvoice {
                    source: extracted.source,
                    record,
                })
            }
            Err(StoreError::Duplicate(duplicate)) => {
                info!("Skipping {}: {}", filename, duplicate);
                FileOutcome::Skipped(SkippedFile {
                    filename,
                    stage: Stage::Persisted,
                    reason: duplicate.to_string(),
                })
            }
            Err(e) => failed(&filename, Stage::Persisted, e.into()),
        }
    }

    /// Process uploads one after another; a failing file does not stop the batch.
    pub async fn process_batch(&self, session: &Session, uploads: Vec<UploadedFile>) -> BatchReport {
        self.process_batch_with(session, uploads, |_, _| {}).await
    }

    /// Like [`Pipeline::process_batch`], calling `on_file` with the index and
    /// outcome of each file as it completes.
    pub async fn process_batch_with<F>(
        &self,
        session: &Session,
        uploads: Vec<UploadedFile>,
        mut on_file: F,
    ) -> BatchReport
    where
        F: FnMut(usize, &FileOutcome),
    {
        let total = uploads.len();
        let mut report = BatchReport::default();

        for (index, upload) in uploads.into_iter().enumerate() {
            let outcome = self.process_single(session, upload).await;
            on_file(index, &outcome);
            report.push(outcome);
        }

        info!(
            "Batch finished: {} of {} processed, {} skipped, {} failed",
            report.processed.len(),
            total,
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Read and process files from disk one after another. A file that cannot
    /// be read fails at [`Stage::Received`] and the batch moves on.
    pub async fn process_paths_with<F>(
        &self,
        session: &Session,
        paths: &[PathBuf],
        mut on_file: F,
    ) -> BatchReport
    where
        F: FnMut(usize, &FileOutcome),
    {
        let mut report = BatchReport::default();

        for (index, path) in paths.iter().enumerate() {
            let outcome = match UploadedFile::from_path(path) {
                Ok(upload) => self.process_single(session, upload).await,
                Err(e) => failed(&upload_name(path), Stage::Received, e.into()),
            };
            on_file(index, &outcome);
            report.push(outcome);
        }

        info!(
            "Batch finished: {} of {} processed, {} skipped, {} failed",
            report.processed.len(),
            paths.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Spool the upload to a scoped temp file and extract on a blocking worker.
    async fn extract(&self, upload: UploadedFile) -> crate::Result<ExtractedText> {
        let mut spool = tempfile::Builder::new()
            .prefix("invex-upload-")
            .suffix(".pdf")
            .tempfile()?;
        spool.write_all(&upload.data)?;
        spool.flush()?;
        drop(upload);

        let extractor = Arc::clone(&self.extractor);
        // Owned by the worker: removed when extraction ends, even after a timeout.
        let task = tokio::task::spawn_blocking(move || {
            let result = extractor.extract_file(spool.path());
            drop(spool);
            result
        });

        let extracted = match tokio::time::timeout(self.extraction_timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(ExtractionError::Pdf(format!("extraction worker failed: {}", join)).into());
            }
            Err(_) => return Err(ExtractionError::Timeout(self.extraction_timeout).into()),
        };

        if extracted.is_blank() {
            return Err(ExtractionError::Blank.into());
        }
        Ok(extracted)
    }
}

fn failed(filename: &str, stage: Stage, error: InvexError) -> FileOutcome {
    error!("Failed to process {} at {}: {}", filename, stage, error);
    FileOutcome::Failed(FailedFile::new(filename, stage, &error))
}
