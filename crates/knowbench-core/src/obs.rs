//! Structured lifecycle events for benchmark runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Set `KNOWBENCH_LOG` to adjust verbosity and pass `--json` to the CLI for
//! JSON lines.

use tracing::info;

/// Span tagged with one run's configuration.
///
/// Attach it with `tracing::Instrument` so events from every question of the
/// run carry `run_id`, `model` and `temperature`.
pub fn run_span(run_id: &str, model: &str, temperature: f64) -> tracing::Span {
    tracing::info_span!(
        "knowbench.run",
        run_id = %run_id,
        model = %model,
        temperature = temperature,
    )
}

/// Bank parsed: how many questions were kept and rejected.
pub fn emit_bank_loaded(path: &str, questions: usize, rejected: usize, digest: &str) {
    info!(
        event = "bank.loaded",
        path = %path,
        questions = questions,
        rejected = rejected,
        digest = %digest,
    );
}

pub fn emit_run_started(run_id: &str, model: &str, temperature: f64, total_questions: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        model = %model,
        temperature = temperature,
        total_questions = total_questions,
    );
}

/// One question asked, scored and recorded.
pub fn emit_question_scored(task_id: &str, outcome: &str, reason: &str, attempts: u32) {
    info!(
        event = "question.scored",
        task_id = %task_id,
        outcome = %outcome,
        reason = %reason,
        attempts = attempts,
    );
}

/// Question already in the ledger for this configuration; not asked again.
pub fn emit_question_skipped(task_id: &str) {
    info!(event = "question.skipped", task_id = %task_id);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, total: usize, correct: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total = total,
        correct = correct,
    );
}

/// A run aborted before reaching the end of the bank (warning level).
pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.aborted", run_id = %run_id, error = %error);
}
