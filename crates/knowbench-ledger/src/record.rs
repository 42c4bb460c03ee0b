//! Persisted row types.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Scoring outcome stored in the `result` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Correct,
    Incorrect,
    /// The question's answer type / scoring method has no scoring rule.
    #[serde(rename = "Scoring Error")]
    ScoringError,
}

impl Outcome {
    /// Label written to the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Correct => "Correct",
            Outcome::Incorrect => "Incorrect",
            Outcome::ScoringError => "Scoring Error",
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated question for one (model, temperature) configuration.
///
/// Field order matches the ledger header; rows are serialized positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub temperature: f64,
    pub task_id: String,
    pub domain: String,
    pub result: Outcome,
}

impl ResultRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        model_name: impl Into<String>,
        temperature: f64,
        task_id: impl Into<String>,
        domain: impl Into<String>,
        result: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            model_name: model_name.into(),
            temperature,
            task_id: task_id.into(),
            domain: domain.into(),
            result,
        }
    }

    /// Whether this row belongs to the given configuration.
    pub fn matches_config(&self, model_name: &str, temperature: f64) -> bool {
        self.model_name == model_name && self.temperature == temperature
    }
}

/// Accept RFC 3339 timestamps, and offset-less ones read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("unrecognized timestamp '{raw}'"))
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Correct.to_string(), "Correct");
        assert_eq!(Outcome::Incorrect.to_string(), "Incorrect");
        assert_eq!(Outcome::ScoringError.to_string(), "Scoring Error");
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 8, 1, 12, 34, 56).unwrap();
        assert_eq!(parse_timestamp("2025-08-01T12:34:56Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01T14:34:56+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-01 12:34:56"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-08-01T12:34:56.123456"),
            Some(expected + chrono::Duration::microseconds(123_456))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_matches_config() {
        let record = ResultRecord::new("gemma3:4b", 0.7, "t1", "syntax", Outcome::Correct);
        assert!(record.matches_config("gemma3:4b", 0.7));
        assert!(!record.matches_config("gemma3:4b", 0.1));
        assert!(!record.matches_config("gemma3:12b", 0.7));
    }
}
