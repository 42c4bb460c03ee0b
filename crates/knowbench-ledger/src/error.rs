//! Error types for knowbench-ledger

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or appending ledger rows
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying file I/O failed
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failed
    #[error("ledger csv error: {0}")]
    Csv(#[from] csv::Error),

    /// An existing store does not carry the expected header row
    #[error("ledger {path} has unexpected header {found:?}")]
    HeaderMismatch { path: PathBuf, found: Vec<String> },

    /// A record could not be encoded into a row
    #[error("failed to encode record: {0}")]
    Encode(String),

    /// A previous writer panicked while holding the file lock
    #[error("ledger writer lock poisoned")]
    Poisoned,

    /// The blocking I/O task was cancelled or panicked
    #[error("ledger task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::Task(err.to_string())
    }
}
