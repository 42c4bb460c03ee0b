//! knowbench core library
//!
//! Loads a question bank, asks a model each question over an
//! OpenAI-compatible chat endpoint, scores the answers and appends one
//! ledger row per question.

pub mod bank;
pub mod client;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod question;
pub mod report;
pub mod scoring;
pub mod telemetry;

pub use bank::{load_bank, parse_bank, LoadedBank, MalformedQuestion};
pub use client::{
    parse_answer, render_prompt, strip_code_fence, Answer, AnswerOutcome, ClientConfig,
    HttpModelClient, ModelClient,
};
pub use driver::{
    run_sweep, BenchmarkRun, ConsoleProgress, DriverOptions, NoProgress, ProgressSink, RunConfig,
    RunPhase, RunSummary,
};
pub use error::{BankError, ClientError, DriverError, Result};
pub use question::{OutputSchema, Question, QuestionKind};
pub use report::LedgerReport;
pub use scoring::{score, Outcome, Verdict};

pub use knowbench_ledger::{CsvLedger, ResultLedger, ResultRecord};
