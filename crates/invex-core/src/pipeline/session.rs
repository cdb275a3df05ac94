//! Per-session state shared by every pipeline run.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::Result;
use crate::models::config::InvexConfig;
use crate::store::InvoiceStore;
use crate::tax::TaxTable;

/// The store (behind a single writer lock) and the tax table in force.
pub struct Session {
    store: Mutex<InvoiceStore>,
    tax_table: Arc<TaxTable>,
}

impl Session {
    pub fn new(store: InvoiceStore, tax_table: TaxTable) -> Self {
        Self {
            store: Mutex::new(store),
            tax_table: Arc::new(tax_table),
        }
    }

    /// Open the configured store and tax table.
    pub fn open(config: &InvexConfig) -> Result<Self> {
        let tax_table = TaxTable::from_file_or_empty(&config.tax.rates_path, config.tax.rate_unit)?;
        let store = InvoiceStore::open(&config.store.path)?;
        info!(
            "Session ready: {} tax categories, {} stored invoices",
            tax_table.len(),
            store.count()
        );
        Ok(Self::new(store, tax_table))
    }

    /// Exclusive access to the store.
    pub async fn store(&self) -> MutexGuard<'_, InvoiceStore> {
        self.store.lock().await
    }

    pub fn tax_table(&self) -> &TaxTable {
        &self.tax_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{StoreConfig, TaxConfig};

    #[tokio::test]
    async fn test_open_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = InvexConfig {
            tax: TaxConfig {
                rates_path: dir.path().join("missing_rates.json"),
                ..TaxConfig::default()
            },
            store: StoreConfig {
                path: dir.path().join("invoices.json"),
            },
            ..InvexConfig::default()
        };

        let session = Session::open(&config).unwrap();
        assert!(session.tax_table().is_empty());
        assert_eq!(session.store().await.count(), 0);
    }

    #[tokio::test]
    async fn test_open_corrupt_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("invoices.json");
        std::fs::write(&store_path, "not json").unwrap();
        let config = InvexConfig {
            store: StoreConfig { path: store_path },
            tax: TaxConfig {
                rates_path: dir.path().join("missing_rates.json"),
                ..TaxConfig::default()
            },
            ..InvexConfig::default()
        };

        let err = Session::open(&config).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageCorrupt);
    }
}
