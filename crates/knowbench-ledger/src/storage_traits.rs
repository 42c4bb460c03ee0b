//! Storage trait definitions for the result ledger
//!
//! The ledger is append-only: `append` is the only mutation. Multiple runs
//! (different models or temperatures) may target the same ledger; rows are
//! disambiguated by `(model_name, temperature, task_id)` but uniqueness is
//! not enforced, since repeated trials are legitimate.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::record::ResultRecord;

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Append-only store of evaluation results.
///
/// Guarantees:
/// - `append` returning `Ok` means the record is durable.
/// - Concurrent `append` calls never interleave or corrupt rows.
/// - `records` returns rows in append order; earlier rows are never altered.
#[async_trait]
pub trait ResultLedger: Send + Sync {
    /// Durably append one record.
    async fn append(&self, record: &ResultRecord) -> LedgerResult<()>;

    /// Read every record back, in append order.
    async fn records(&self) -> LedgerResult<Vec<ResultRecord>>;

    /// Task ids already recorded for one (model, temperature) configuration.
    async fn completed_tasks(
        &self,
        model_name: &str,
        temperature: f64,
    ) -> LedgerResult<HashSet<String>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .filter(|r| r.matches_config(model_name, temperature))
            .map(|r| r.task_id)
            .collect())
    }
}
