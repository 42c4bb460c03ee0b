//! Benchmark driver.
//!
//! A [`BenchmarkRun`] takes one (model, temperature) configuration through
//! the whole bank: for each question it asks the model, scores the answer and
//! appends one ledger row, in that order. Answer failures never stop the
//! loop; only a ledger write failure does.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{warn, Instrument};
use uuid::Uuid;

use knowbench_ledger::{ResultLedger, ResultRecord};

use crate::client::{render_prompt, AnswerOutcome, ModelClient};
use crate::error::{DriverError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::question::Question;
use crate::scoring::{score, Outcome, Verdict};

pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// One point in the benchmark grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub model: String,
    pub temperature: f64,
}

impl RunConfig {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }

    /// Every model at every temperature, models outermost.
    pub fn grid(models: &[String], temperatures: &[f64]) -> Vec<Self> {
        models
            .iter()
            .flat_map(|m| temperatures.iter().map(move |t| Self::new(m.clone(), *t)))
            .collect()
    }
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ temperature {}", self.model, self.temperature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Completed,
    /// Stopped early because the ledger rejected a row.
    Aborted,
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Delay between consecutive questions, and between retry attempts.
    pub pacing: Duration,
    /// Extra attempts after a transport failure.
    pub max_retries: u32,
    /// Skip questions the ledger already holds a row for under this
    /// configuration.
    pub skip_completed: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            max_retries: 0,
            skip_completed: false,
        }
    }
}

/// Tally for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub model: String,
    pub temperature: f64,
    /// Questions asked and recorded in this run.
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub scoring_errors: usize,
    /// Transport failures plus malformed answers; a subset of `incorrect`.
    pub answer_failures: usize,
    /// Questions not asked because the ledger already had them.
    pub skipped: usize,
}

impl RunSummary {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
            total: 0,
            correct: 0,
            incorrect: 0,
            scoring_errors: 0,
            answer_failures: 0,
            skipped: 0,
        }
    }

    /// Fraction of recorded questions answered correctly; 0 for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub(crate) fn count(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Correct => self.correct += 1,
            Outcome::Incorrect => self.incorrect += 1,
            Outcome::ScoringError => self.scoring_errors += 1,
        }
    }

    fn tally(&mut self, verdict: &Verdict, answer: &AnswerOutcome) {
        self.count(verdict.outcome);
        if answer.is_failure() {
            self.answer_failures += 1;
        }
    }

    /// Console block printed at the end of a run.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Model: {} (temperature {})\n  > Score: {} / {}\n  > Accuracy: {:.2}%",
            self.model,
            self.temperature,
            self.correct,
            self.total,
            self.accuracy() * 100.0
        );
        if self.scoring_errors > 0 {
            out.push_str(&format!("\n  > Scoring errors: {}", self.scoring_errors));
        }
        if self.answer_failures > 0 {
            out.push_str(&format!("\n  > Answer failures: {}", self.answer_failures));
        }
        if self.skipped > 0 {
            out.push_str(&format!("\n  > Skipped (already recorded): {}", self.skipped));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Receives one notification per question. `index` is 1-based.
pub trait ProgressSink: Send + Sync {
    fn run_started(&self, _config: &RunConfig, _total: usize) {}

    fn question_scored(&self, index: usize, total: usize, task_id: &str, verdict: &Verdict);

    fn question_skipped(&self, _index: usize, _total: usize, _task_id: &str) {}
}

/// Prints `(i/N) <task_id>: <Outcome> (<reason>)` to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn run_started(&self, config: &RunConfig, total: usize) {
        println!("\n--- Starting benchmark: {config} ({total} questions) ---");
    }

    fn question_scored(&self, index: usize, total: usize, task_id: &str, verdict: &Verdict) {
        println!(
            "({index}/{total}) {task_id}: {} ({})",
            verdict.outcome, verdict.reason
        );
    }

    fn question_skipped(&self, index: usize, total: usize, task_id: &str) {
        println!("({index}/{total}) {task_id}: skipped (already recorded)");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn question_scored(&self, _: usize, _: usize, _: &str, _: &Verdict) {}
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One configuration's pass over the bank.
#[derive(Debug)]
pub struct BenchmarkRun {
    id: Uuid,
    config: RunConfig,
    phase: RunPhase,
}

impl BenchmarkRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            phase: RunPhase::NotStarted,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Ask, score and record every question in order.
    ///
    /// A run executes once; calling this again returns
    /// [`DriverError::AlreadyStarted`].
    pub async fn execute(
        &mut self,
        questions: &[Question],
        client: &dyn ModelClient,
        ledger: &dyn ResultLedger,
        options: &DriverOptions,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary> {
        if self.phase != RunPhase::NotStarted {
            return Err(DriverError::AlreadyStarted(self.id));
        }
        self.phase = RunPhase::Running;

        let run_id = self.id.to_string();
        let span = obs::run_span(&run_id, &self.config.model, self.config.temperature);
        let result = self
            .drive(&run_id, questions, client, ledger, options, progress)
            .instrument(span)
            .await;

        self.phase = match &result {
            Ok(_) => RunPhase::Completed,
            Err(e) => {
                obs::emit_run_aborted(&run_id, e);
                RunPhase::Aborted
            }
        };
        result
    }

    async fn drive(
        &self,
        run_id: &str,
        questions: &[Question],
        client: &dyn ModelClient,
        ledger: &dyn ResultLedger,
        options: &DriverOptions,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary> {
        let RunConfig { model, temperature } = &self.config;
        let started = Instant::now();
        let total = questions.len();
        obs::emit_run_started(run_id, model, *temperature, total);
        progress.run_started(&self.config, total);

        let completed: HashSet<String> = if options.skip_completed {
            ledger.completed_tasks(model, *temperature).await?
        } else {
            HashSet::new()
        };

        let mut summary = RunSummary::new(model.clone(), *temperature);
        let mut asked_any = false;

        for (i, question) in questions.iter().enumerate() {
            if completed.contains(&question.task_id) {
                summary.skipped += 1;
                obs::emit_question_skipped(&question.task_id);
                progress.question_skipped(i + 1, total, &question.task_id);
                continue;
            }

            if asked_any {
                pace(options.pacing).await;
            }
            asked_any = true;

            let prompt = render_prompt(question);
            let (answer, attempts) = self.ask(client, &prompt, options).await;
            let verdict = score(question, &answer);

            let record = ResultRecord::new(
                model.clone(),
                *temperature,
                question.task_id.clone(),
                question.domain.clone(),
                verdict.outcome,
            );
            ledger.append(&record).await?;
            METRICS.inc_records_appended();

            summary.tally(&verdict, &answer);
            obs::emit_question_scored(
                &question.task_id,
                verdict.outcome.as_str(),
                &verdict.reason,
                attempts,
            );
            progress.question_scored(i + 1, total, &question.task_id, &verdict);
        }

        obs::emit_run_finished(
            run_id,
            started.elapsed().as_millis() as u64,
            summary.total,
            summary.correct,
        );
        Ok(summary)
    }

    /// Ask once, plus up to `max_retries` more times while the transport
    /// fails. Returns the last outcome and the number of attempts.
    async fn ask(
        &self,
        client: &dyn ModelClient,
        prompt: &str,
        options: &DriverOptions,
    ) -> (AnswerOutcome, u32) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            METRICS.inc_questions_asked();
            let answer = client
                .ask(prompt, &self.config.model, self.config.temperature)
                .await;

            match &answer {
                AnswerOutcome::TransportFailure { cause } => {
                    METRICS.inc_transport_failures();
                    if attempts <= options.max_retries {
                        warn!(attempt = attempts, cause = %cause, "transport failure, retrying");
                        pace(options.pacing).await;
                        continue;
                    }
                }
                AnswerOutcome::MalformedAnswer { .. } => METRICS.inc_malformed_answers(),
                AnswerOutcome::Answered(_) => {}
            }
            return (answer, attempts);
        }
    }
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Run several configurations against one bank and one shared ledger.
///
/// Sequential sweeps stop at the first failing run. Concurrent sweeps drive
/// every run to its end and then report the first failure. Summaries come
/// back in `configs` order either way.
pub async fn run_sweep(
    configs: &[RunConfig],
    questions: &[Question],
    client: &dyn ModelClient,
    ledger: Arc<dyn ResultLedger>,
    options: &DriverOptions,
    progress: &dyn ProgressSink,
    concurrent: bool,
) -> Result<Vec<RunSummary>> {
    let ledger = ledger.as_ref();

    if !concurrent {
        let mut summaries = Vec::with_capacity(configs.len());
        for config in configs {
            let mut run = BenchmarkRun::new(config.clone());
            summaries.push(
                run.execute(questions, client, ledger, options, progress)
                    .await?,
            );
        }
        return Ok(summaries);
    }

    let runs = configs.iter().map(|config| async move {
        let mut run = BenchmarkRun::new(config.clone());
        run.execute(questions, client, ledger, options, progress)
            .await
    });
    futures::future::join_all(runs).await.into_iter().collect()
}
