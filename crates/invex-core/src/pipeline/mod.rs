//! Upload-to-store orchestration.

mod orchestrator;
mod session;

pub use orchestrator::Pipeline;
pub use session::Session;

use std::path::Path;

use serde::Serialize;

use crate::error::{ErrorKind, InvexError};
use crate::models::invoice::{InvoiceRecord, TokenUsage};
use crate::pdf::TextSource;

/// A file handed to the pipeline: the original upload name and its bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a file from disk, naming the upload after its file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self {
            name: upload_name(path),
            data,
        })
    }
}

pub(crate) fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Processing stages of one file, in order.
///
/// Failed and skipped files record the stage they stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    DuplicateCheck,
    Extracting,
    Parsing,
    TotalsComputed,
    Persisted,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::DuplicateCheck => "duplicate check",
            Stage::Extracting => "extracting",
            Stage::Parsing => "parsing",
            Stage::TotalsComputed => "totals",
            Stage::Persisted => "persisting",
        };
        f.write_str(name)
    }
}

/// A file that made it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedInvoice {
    pub source: TextSource,
    pub record: InvoiceRecord,
}

/// A file skipped because it was already processed.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    /// [`Stage::DuplicateCheck`] for a known file name, [`Stage::Persisted`]
    /// for a known invoice id.
    pub stage: Stage,
    pub reason: String,
}

/// A file that failed at some stage. Nothing was stored for it.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedFile {
    pub(crate) fn new(filename: &str, stage: Stage, error: &InvexError) -> Self {
        Self {
            filename: filename.to_string(),
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Terminal state of one file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Done(ProcessedInvoice),
    Skipped(SkippedFile),
    Failed(FailedFile),
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            FileOutcome::Done(p) => p.record.filename(),
            FileOutcome::Skipped(s) => &s.filename,
            FileOutcome::Failed(f) => &f.filename,
        }
    }
}

/// Outcome of a batch, grouped by terminal state in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: Vec<ProcessedInvoice>,
    pub skipped: Vec<SkippedFile>,
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    pub(crate) fn push(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Done(p) => self.processed.push(p),
            FileOutcome::Skipped(s) => self.skipped.push(s),
            FileOutcome::Failed(f) => self.failed.push(f),
        }
    }

    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    /// Oracle tokens spent on the successfully processed files.
    pub fn usage(&self) -> TokenUsage {
        self.processed
            .iter()
            .fold(TokenUsage::default(), |acc, p| {
                let usage = p.record.usage();
                TokenUsage {
                    prompt_tokens: acc.prompt_tokens.saturating_add(usage.prompt_tokens),
                    completion_tokens: acc.completion_tokens.saturating_add(usage.completion_tokens),
                }
            })
    }
}
