//! In-memory fakes for storage traits (testing only)

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::record::ResultRecord;
use crate::storage_traits::{LedgerResult, ResultLedger};

/// In-memory ledger backed by a `Vec<ResultRecord>`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<ResultRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with pre-existing rows.
    pub fn with_records(records: Vec<ResultRecord>) -> Self {
        Self {
            rows: Mutex::new(records),
        }
    }

    /// Number of rows appended so far.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultLedger for MemoryLedger {
    async fn append(&self, record: &ResultRecord) -> LedgerResult<()> {
        let mut rows = self.rows.lock().map_err(|_| LedgerError::Poisoned)?;
        rows.push(record.clone());
        Ok(())
    }

    async fn records(&self) -> LedgerResult<Vec<ResultRecord>> {
        let rows = self.rows.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(rows.clone())
    }
}
