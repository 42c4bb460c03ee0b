//! knowbench-ledger: append-only result storage for benchmark runs
//!
//! Every evaluated question produces exactly one [`ResultRecord`]. Records are
//! only ever appended; nothing in this crate updates or deletes a row.
//!
//! ## Key Components
//!
//! - `ResultLedger`: backend-agnostic async append/read trait
//! - `CsvLedger`: durable CSV file backend (create-or-append)
//! - `fakes::MemoryLedger`: in-memory backend for tests

pub mod csv_ledger;
mod error;
pub mod fakes;
pub mod record;
pub mod storage_traits;

pub use csv_ledger::{CsvLedger, LEDGER_HEADER};
pub use error::LedgerError;
pub use record::{Outcome, ResultRecord};
pub use storage_traits::{LedgerResult, ResultLedger};
