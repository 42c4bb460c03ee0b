//! Question bank loader.
//!
//! A bank is a JSON Lines file, one question per line. Lines are decoded
//! independently: a malformed line is logged, recorded in
//! [`LoadedBank::rejected`] and skipped, and loading continues. Only a missing
//! bank aborts.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::BankError;
use crate::obs;
use crate::question::Question;

/// A bank line that could not be turned into a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedQuestion {
    /// 1-based line number within the bank.
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for MalformedQuestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Result of loading a bank.
#[derive(Debug, Clone, Default)]
pub struct LoadedBank {
    /// Valid questions, in authoring order.
    pub questions: Vec<Question>,
    /// Lines skipped because they were malformed.
    pub rejected: Vec<MalformedQuestion>,
    /// SHA-256 hex digest of the raw bank bytes.
    pub digest: String,
}

impl LoadedBank {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Load a bank from disk.
pub fn load_bank(path: impl AsRef<Path>) -> Result<LoadedBank, BankError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BankError::BankNotFound(path.to_path_buf())
        } else {
            BankError::Io(e)
        }
    })?;

    let bank = parse_bank(file)?;
    obs::emit_bank_loaded(
        &path.display().to_string(),
        bank.questions.len(),
        bank.rejected.len(),
        &bank.digest,
    );
    Ok(bank)
}

/// Parse a bank from any reader.
pub fn parse_bank<R: Read>(reader: R) -> Result<LoadedBank, BankError> {
    let mut hasher = Sha256::new();
    let mut bank = LoadedBank::default();
    let mut seen: HashSet<String> = HashSet::new();

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        hasher.update(&buf);

        let parsed = match std::str::from_utf8(&buf) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => Question::from_json_line(text.trim()),
            Err(e) => Err(format!("line is not valid UTF-8: {e}")),
        };

        let parsed = parsed.and_then(|q| {
            if seen.contains(&q.task_id) {
                Err(format!("duplicate task_id '{}'", q.task_id))
            } else {
                Ok(q)
            }
        });

        match parsed {
            Ok(q) => {
                seen.insert(q.task_id.clone());
                bank.questions.push(q);
            }
            Err(reason) => {
                warn!(line = line_no, reason = %reason, "skipping malformed question");
                bank.rejected.push(MalformedQuestion {
                    line: line_no,
                    reason,
                });
            }
        }
    }

    bank.digest = hex::encode(hasher.finalize());
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionKind;

    const MC: &str = r#"{"task_id":"mc_001","domain":"syntax","prompt":"Pick one","answer_type":"multiple_choice","choices":["a","b","c"],"correct_index":2,"scoring":{"method":"choice_equals_index"}}"#;
    const PH: &str = r#"{"task_id":"ph_001","domain":"panel","prompt":"Name it","answer_type":"structured_single","output_schema":{"properties":{"answer":{"type":"string"}}},"scoring":{"method":"phrase_match","accepted_phrases":["fixed effects"]}}"#;

    #[test]
    fn test_parse_preserves_order_and_skips_blank_lines() {
        let input = format!("{MC}\n\n{PH}\n");
        let bank = parse_bank(input.as_bytes()).unwrap();
        assert!(bank.is_clean());
        let ids: Vec<_> = bank.questions.iter().map(|q| q.task_id.as_str()).collect();
        assert_eq!(ids, vec!["mc_001", "ph_001"]);
    }

    #[test]
    fn test_malformed_line_does_not_abort_loading() {
        let input = format!("{MC}\n{{not json\n{PH}\n");
        let bank = parse_bank(input.as_bytes()).unwrap();
        assert_eq!(bank.questions.len(), 2);
        assert_eq!(bank.rejected.len(), 1);
        assert_eq!(bank.rejected[0].line, 2);
    }

    #[test]
    fn test_invalid_utf8_line_is_localized() {
        let mut input = MC.as_bytes().to_vec();
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(PH.as_bytes());
        let bank = parse_bank(input.as_slice()).unwrap();
        assert_eq!(bank.questions.len(), 2);
        assert_eq!(bank.rejected.len(), 1);
        assert!(bank.rejected[0].reason.contains("UTF-8"));
    }

    #[test]
    fn test_duplicate_task_id_rejected() {
        let input = format!("{MC}\n{MC}\n");
        let bank = parse_bank(input.as_bytes()).unwrap();
        assert_eq!(bank.questions.len(), 1);
        assert_eq!(bank.rejected[0].line, 2);
        assert!(bank.rejected[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_digest_is_stable() {
        let a = parse_bank(MC.as_bytes()).unwrap();
        let b = parse_bank(MC.as_bytes()).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.len(), 64);
        let c = parse_bank(PH.as_bytes()).unwrap();
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_missing_bank_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_bank(dir.path().join("items.jsonl")).unwrap_err();
        assert!(matches!(err, BankError::BankNotFound(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        std::fs::write(&path, format!("{MC}\n{PH}")).unwrap();
        let bank = load_bank(&path).unwrap();
        assert_eq!(bank.questions.len(), 2);
        assert!(matches!(
            bank.questions[0].kind,
            QuestionKind::MultipleChoice { correct_index: 2, .. }
        ));
    }
}
