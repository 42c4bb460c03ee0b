//! Global atomic counters for benchmark runs.
//!
//! Counters are bumped silently at the call site. Call [`Metrics::flush`] at
//! the end of a command to emit them as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    questions_asked: AtomicU64,
    transport_failures: AtomicU64,
    malformed_answers: AtomicU64,
    records_appended: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            questions_asked: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            malformed_answers: AtomicU64::new(0),
            records_appended: AtomicU64::new(0),
        }
    }

    /// One request sent to the model, retries included.
    pub fn inc_questions_asked(&self) {
        self.questions_asked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "questions_asked", "counter incremented");
    }

    pub fn inc_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transport_failures", "counter incremented");
    }

    pub fn inc_malformed_answers(&self) {
        self.malformed_answers.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "malformed_answers", "counter incremented");
    }

    pub fn inc_records_appended(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_appended", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            questions_asked = self.questions_asked(),
            transport_failures = self.transport_failures(),
            malformed_answers = self.malformed_answers(),
            records_appended = self.records_appended(),
        );
    }

    pub fn questions_asked(&self) -> u64 {
        self.questions_asked.load(Ordering::Relaxed)
    }

    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    pub fn malformed_answers(&self) -> u64 {
        self.malformed_answers.load(Ordering::Relaxed)
    }

    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.questions_asked.store(0, Ordering::Relaxed);
        self.transport_failures.store(0, Ordering::Relaxed);
        self.malformed_answers.store(0, Ordering::Relaxed);
        self.records_appended.store(0, Ordering::Relaxed);
    }
}
