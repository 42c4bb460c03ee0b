//! Error taxonomy for knowbench-core.
//!
//! Only conditions that stop work are errors here. A model that fails to
//! answer, or answers garbage, is an [`crate::client::AnswerOutcome`]; a
//! question with no scoring rule is an [`crate::scoring::Outcome`]. Neither
//! ever propagates out of a run.

use std::path::PathBuf;

use knowbench_ledger::LedgerError;

/// Errors loading a question bank.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("question bank not found: {0}")]
    BankNotFound(PathBuf),

    #[error("io error reading question bank: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors constructing or probing the model client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(String),

    #[error("model server unreachable at {url}: {cause}")]
    Unreachable { url: String, cause: String },
}

/// Errors that abort a benchmark run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("run {0} was already started")]
    AlreadyStarted(uuid::Uuid),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
