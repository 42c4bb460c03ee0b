//! Scoring engine.
//!
//! `score` is a pure function of a question and the model's answer. Model
//! misbehaviour (no answer, unparseable answer, wrong or non-integer choice)
//! is always `Incorrect`; `ScoringError` is reserved for questions whose
//! answer type / method pair has no scoring rule.

use serde_json::Value;

pub use knowbench_ledger::Outcome;

use crate::client::{Answer, AnswerOutcome};
use crate::question::{Question, QuestionKind};

/// Outcome of scoring one answer, with a diagnostic reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub reason: String,
}

impl Verdict {
    pub fn correct(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Correct,
            reason: reason.into(),
        }
    }

    pub fn incorrect(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Incorrect,
            reason: reason.into(),
        }
    }

    pub fn scoring_error(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::ScoringError,
            reason: reason.into(),
        }
    }
}

/// Score `answer` against `question`.
pub fn score(question: &Question, answer: &AnswerOutcome) -> Verdict {
    let answer = match answer {
        AnswerOutcome::Answered(map) => map,
        AnswerOutcome::TransportFailure { cause } => {
            return Verdict::incorrect(format!("no valid answer (transport failure: {cause})"))
        }
        AnswerOutcome::MalformedAnswer { cause, .. } => {
            return Verdict::incorrect(format!("no valid answer (malformed answer: {cause})"))
        }
    };

    match &question.kind {
        QuestionKind::MultipleChoice { correct_index, .. } => {
            score_choice(answer.get("choice"), *correct_index)
        }
        QuestionKind::StructuredNumeric { expected_value, .. } => {
            score_numeric(first_value(answer), expected_value)
        }
        QuestionKind::StructuredPhrase {
            accepted_phrases, ..
        } => score_phrase(first_value(answer), accepted_phrases),
        QuestionKind::Unrecognized {
            answer_type,
            method,
            ..
        } => Verdict::scoring_error(format!(
            "no scoring rule for answer type '{answer_type}' with method '{}'",
            method.as_deref().unwrap_or("<none>")
        )),
    }
}

fn score_choice(choice: Option<&Value>, correct_index: i64) -> Verdict {
    let Some(value) = choice else {
        return Verdict::incorrect("answer has no 'choice' field");
    };
    match choice_index(value) {
        Some(idx) if idx == correct_index => Verdict::correct(format!("chose index {idx}")),
        Some(idx) => Verdict::incorrect(format!("chose index {idx}, expected {correct_index}")),
        None => Verdict::incorrect(format!("non-integer choice: {value}")),
    }
}

/// Integer reading of a `choice` value: integer numbers, integral floats and
/// strings holding an integer.
fn choice_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn score_numeric(actual: Option<&Value>, expected: &Value) -> Verdict {
    let Some(actual) = actual else {
        return Verdict::incorrect("answer has no fields");
    };
    let (got, want) = (scalar_text(actual), scalar_text(expected));
    if got == want {
        Verdict::correct(format!("answered {got}"))
    } else {
        Verdict::incorrect(format!("numeric check failed: expected {want}, got {got}"))
    }
}

fn score_phrase(actual: Option<&Value>, accepted: &[String]) -> Verdict {
    let Some(actual) = actual else {
        return Verdict::incorrect("answer has no fields");
    };
    let text = scalar_text(actual).to_lowercase();
    match accepted
        .iter()
        .find(|phrase| text.contains(&phrase.to_lowercase()))
    {
        Some(phrase) => Verdict::correct(format!("matched phrase '{phrase}'")),
        None => Verdict::incorrect(format!(
            "phrase check failed: '{text}' contains none of the accepted phrases"
        )),
    }
}

/// First field of a structured answer; such answers carry a single field.
fn first_value(answer: &Answer) -> Option<&Value> {
    answer.values().next()
}

/// String form used for comparisons: strings verbatim, everything else as
/// its JSON text (`4` -> "4", `4.0` -> "4.0", `true` -> "true").
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
