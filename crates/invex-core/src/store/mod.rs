//! Invoice records mirrored to a single JSON file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{DuplicateError, StoreError};
use crate::models::invoice::InvoiceRecord;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    documents: Vec<InvoiceRecord>,
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    documents: &'a [InvoiceRecord],
}

/// In-memory invoice collection persisted to one JSON document.
///
/// Records keep insertion order. Lookups are linear scans; the store is
/// meant for a single writer.
#[derive(Debug)]
pub struct InvoiceStore {
    path: PathBuf,
    documents: Vec<InvoiceRecord>,
}

impl InvoiceStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let documents = Self::read(&path)?;
        info!("Opened invoice store {} ({} records)", path.display(), documents.len());
        Ok(Self { path, documents })
    }

    fn read(path: &Path) -> Result<Vec<InvoiceRecord>> {
        if !path.exists() {
            debug!("Store file {} does not exist yet", path.display());
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let document: StoreDocument =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        for record in &document.documents {
            for issue in record.verify_totals() {
                warn!("Stored record '{}': {}", record.filename(), issue);
            }
        }

        Ok(document.documents)
    }

    /// Replace the in-memory collection with the file's current contents.
    pub fn reload(&mut self) -> Result<()> {
        self.documents = Self::read(&self.path)?;
        Ok(())
    }

    /// Write the collection to disk, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&StoreDocumentRef {
            documents: &self.documents,
        })
        .map_err(StoreError::Serialize)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!("Saved {} records to {}", self.documents.len(), self.path.display());
        Ok(())
    }

    /// Add a record and persist. Rejects a known invoice id or filename.
    pub fn add(&mut self, record: InvoiceRecord) -> Result<()> {
        if !record.invoice_id().is_empty() && self.get(record.invoice_id()).is_some() {
            return Err(DuplicateError::InvoiceId(record.invoice_id().to_string()).into());
        }
        if self.get_by_filename(record.filename()).is_some() {
            return Err(DuplicateError::Filename(record.filename().to_string()).into());
        }

        self.documents.push(record);
        if let Err(e) = self.save() {
            self.documents.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Whether a record exists for `filename` or `invoice_id`. Empty keys never match.
    pub fn is_processed(&self, filename: &str, invoice_id: &str) -> bool {
        self.get_by_filename(filename).is_some() || self.get(invoice_id).is_some()
    }

    /// Record with the given invoice id.
    pub fn get(&self, invoice_id: &str) -> Option<&InvoiceRecord> {
        if invoice_id.is_empty() {
            return None;
        }
        self.documents.iter().find(|r| r.invoice_id() == invoice_id)
    }

    /// Record created from the given upload name.
    pub fn get_by_filename(&self, filename: &str) -> Option<&InvoiceRecord> {
        if filename.is_empty() {
            return None;
        }
        self.documents.iter().find(|r| r.filename() == filename)
    }

    /// Remove the record with `invoice_id` and persist. Returns whether one was removed.
    pub fn delete(&mut self, invoice_id: &str) -> Result<bool> {
        if invoice_id.is_empty() {
            return Ok(false);
        }
        self.remove_where(|r| r.invoice_id() == invoice_id)
    }

    /// Remove the record created from `filename` and persist.
    pub fn delete_by_filename(&mut self, filename: &str) -> Result<bool> {
        if filename.is_empty() {
            return Ok(false);
        }
        self.remove_where(|r| r.filename() == filename)
    }

    fn remove_where(&mut self, pred: impl Fn(&InvoiceRecord) -> bool) -> Result<bool> {
        let Some(pos) = self.documents.iter().position(pred) else {
            return Ok(false);
        };
        let removed = self.documents.remove(pos);
        if let Err(e) = self.save() {
            self.documents.insert(pos, removed);
            return Err(e);
        }
        info!("Deleted record for '{}'", removed.filename());
        Ok(true)
    }

    /// All records in insertion order.
    pub fn list_all(&self) -> &[InvoiceRecord] {
        &self.documents
    }

    pub fn count(&self) -> usize {
        self.documents.len()
    }

    /// Records with at least one line item in `category`.
    pub fn search_by_category(&self, category: &str) -> Vec<&InvoiceRecord> {
        self.documents
            .iter()
            .filter(|r| r.has_category(category))
            .collect()
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
