//! CSV-file-backed ResultLedger implementation
//!
//! Layout: one header row followed by one row per evaluated question.
//! The file is opened in append mode; each record is encoded fully in memory
//! and handed to the OS as a single `write_all` under a process-wide lock,
//! then `sync_data`'d before `append` returns.
//!
//! A trailing row without its line terminator can only come from an append
//! that never returned; `open` cuts it off so new rows start on a fresh line.
//! Readers skip rows they cannot decode and log where they were.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::record::ResultRecord;
use crate::storage_traits::{LedgerResult, ResultLedger};

/// Column names of the result store, in order.
pub const LEDGER_HEADER: [&str; 6] = [
    "timestamp",
    "model_name",
    "temperature",
    "task_id",
    "domain",
    "result",
];

/// Durable CSV ledger.
///
/// Cloning is cheap and clones share the same writer lock.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl CsvLedger {
    /// Open `path`, creating it (and parent directories) with the header row
    /// if it does not exist or is empty. An existing store must carry the
    /// expected header; its rows are never rewritten.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let existing_len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if existing_len > 0 {
            verify_header(&path)?;
            repair_partial_tail(&path, existing_len)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if existing_len == 0 {
            file.write_all(&encode_header()?)?;
            file.sync_data()?;
            info!(path = %path.display(), "created result ledger");
        } else {
            info!(path = %path.display(), bytes = existing_len, "appending to existing result ledger");
        }

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from a ledger file without opening it for writing.
    ///
    /// Rows that cannot be decoded are skipped with a warning naming their
    /// line; I/O failures still fail the read.
    pub fn read_path(path: impl AsRef<Path>) -> LedgerResult<Vec<ResultRecord>> {
        let path = path.as_ref();
        verify_header(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(|p| p.line());
                    warn!(path = %path.display(), ?line, error = %e, "skipping unreadable ledger row");
                    continue;
                }
            };
            let line = row.position().map(|p| p.line());
            if row.len() != LEDGER_HEADER.len() {
                warn!(
                    path = %path.display(),
                    ?line,
                    fields = row.len(),
                    "skipping ledger row with wrong field count"
                );
                continue;
            }
            match row.deserialize::<ResultRecord>(Some(&headers)) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), ?line, error = %e, "skipping undecodable ledger row");
                }
            }
        }
        Ok(records)
    }
}

/// Cut a trailing row that lacks its terminator, or terminate a bare header.
fn repair_partial_tail(path: &Path, len: u64) -> LedgerResult<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut content = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut content)?;

    match content.iter().rposition(|&b| b == b'\n') {
        Some(idx) => {
            let keep = idx as u64 + 1;
            file.set_len(keep)?;
            warn!(
                path = %path.display(),
                dropped_bytes = len - keep,
                "truncated partial row at end of result ledger"
            );
        }
        None => {
            file.seek(SeekFrom::End(0))?;
            file.write_all(b"\n")?;
            warn!(path = %path.display(), "terminated header row of result ledger");
        }
    }
    file.sync_data()?;
    Ok(())
}

#[async_trait]
impl ResultLedger for CsvLedger {
    async fn append(&self, record: &ResultRecord) -> LedgerResult<()> {
        let row = encode_row(record)?;
        let file = Arc::clone(&self.file);

        tokio::task::spawn_blocking(move || -> LedgerResult<()> {
            let mut file = file.lock().map_err(|_| LedgerError::Poisoned)?;
            file.write_all(&row)?;
            file.sync_data()?;
            Ok(())
        })
        .await??;

        debug!(
            task_id = %record.task_id,
            model = %record.model_name,
            result = %record.result,
            "ledger row appended"
        );
        Ok(())
    }

    async fn records(&self) -> LedgerResult<Vec<ResultRecord>> {
        let path = self.path.clone();
        let file = Arc::clone(&self.file);

        // Hold the writer lock so a concurrent append is never observed half-written.
        tokio::task::spawn_blocking(move || {
            let _guard = file.lock().map_err(|_| LedgerError::Poisoned)?;
            CsvLedger::read_path(&path)
        })
        .await?
    }
}

fn verify_header(path: &Path) -> LedgerResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found.iter().map(String::as_str).eq(LEDGER_HEADER.iter().copied()) {
        Ok(())
    } else {
        Err(LedgerError::HeaderMismatch {
            path: path.to_path_buf(),
            found,
        })
    }
}

fn encode_header() -> LedgerResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(LEDGER_HEADER)?;
    writer
        .into_inner()
        .map_err(|e| LedgerError::Encode(e.to_string()))
}

fn encode_row(record: &ResultRecord) -> LedgerResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer
        .into_inner()
        .map_err(|e| LedgerError::Encode(e.to_string()))
}
