//! Question model.
//!
//! A bank line declares its `answer_type` and `scoring.method` as free text.
//! Both are resolved once, at load time, into a [`QuestionKind`] so scoring
//! dispatches on a closed set of variants. Combinations without a scoring
//! rule still load, as [`QuestionKind::Unrecognized`], and surface later as a
//! scoring error for that one question.

use serde::Deserialize;
use serde_json::Value;

pub const MULTIPLE_CHOICE: &str = "multiple_choice";
pub const STRUCTURED_SINGLE: &str = "structured_single";
pub const CHOICE_EQUALS_INDEX: &str = "choice_equals_index";
pub const NUMERIC_MATCH: &str = "numeric_match";
pub const PHRASE_MATCH: &str = "phrase_match";

/// Domain label used when a bank line does not carry one.
pub const DEFAULT_DOMAIN: &str = "uncategorized";

/// Declared response fields, in authoring order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputSchema {
    pub fields: Vec<(String, String)>,
}

impl OutputSchema {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Accepts either `{"properties": {name: {"type": t}}}` or the flat
    /// `{name: t}` / `{name: {"type": t}}` forms.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "output_schema must be an object".to_string())?;

        let props = match obj.get("properties") {
            Some(Value::Object(props)) => props,
            Some(_) => return Err("output_schema.properties must be an object".to_string()),
            None => obj,
        };

        let mut fields = Vec::with_capacity(props.len());
        for (name, decl) in props {
            let ty = match decl {
                Value::String(t) => t.clone(),
                Value::Object(o) => o
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("string")
                    .to_string(),
                other => {
                    return Err(format!(
                        "output_schema field '{name}' has unsupported declaration {other}"
                    ))
                }
            };
            fields.push((name.clone(), ty));
        }

        if fields.is_empty() {
            return Err("output_schema declares no fields".to_string());
        }
        Ok(Self { fields })
    }

    /// Schema hint shown to the model, e.g. `{"answer": "string"}`.
    pub fn hint(&self) -> String {
        let map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), Value::String(ty.clone())))
            .collect();
        Value::Object(map).to_string()
    }
}

/// Answer type and scoring rule of a question.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    /// `multiple_choice` scored by `choice_equals_index`.
    MultipleChoice {
        choices: Vec<String>,
        correct_index: i64,
    },
    /// `structured_single` scored by `numeric_match`.
    StructuredNumeric {
        output_schema: OutputSchema,
        expected_value: Value,
    },
    /// `structured_single` scored by `phrase_match`.
    StructuredPhrase {
        output_schema: OutputSchema,
        accepted_phrases: Vec<String>,
    },
    /// Any other `(answer_type, method)` combination.
    Unrecognized {
        answer_type: String,
        method: Option<String>,
        choices: Option<Vec<String>>,
        output_schema: Option<OutputSchema>,
    },
}

/// One knowledge-probe item.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub task_id: String,
    pub domain: String,
    pub prompt: String,
    pub kind: QuestionKind,
}

impl Question {
    pub fn multiple_choice(
        task_id: impl Into<String>,
        domain: impl Into<String>,
        prompt: impl Into<String>,
        choices: Vec<String>,
        correct_index: i64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            domain: domain.into(),
            prompt: prompt.into(),
            kind: QuestionKind::MultipleChoice {
                choices,
                correct_index,
            },
        }
    }

    pub fn numeric(
        task_id: impl Into<String>,
        domain: impl Into<String>,
        prompt: impl Into<String>,
        output_schema: OutputSchema,
        expected_value: Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            domain: domain.into(),
            prompt: prompt.into(),
            kind: QuestionKind::StructuredNumeric {
                output_schema,
                expected_value,
            },
        }
    }

    pub fn phrase(
        task_id: impl Into<String>,
        domain: impl Into<String>,
        prompt: impl Into<String>,
        output_schema: OutputSchema,
        accepted_phrases: Vec<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            domain: domain.into(),
            prompt: prompt.into(),
            kind: QuestionKind::StructuredPhrase {
                output_schema,
                accepted_phrases,
            },
        }
    }

    /// Declared answer type, as authored.
    pub fn answer_type(&self) -> &str {
        match &self.kind {
            QuestionKind::MultipleChoice { .. } => MULTIPLE_CHOICE,
            QuestionKind::StructuredNumeric { .. } | QuestionKind::StructuredPhrase { .. } => {
                STRUCTURED_SINGLE
            }
            QuestionKind::Unrecognized { answer_type, .. } => answer_type,
        }
    }

    /// Declared scoring method, as authored.
    pub fn method(&self) -> Option<&str> {
        match &self.kind {
            QuestionKind::MultipleChoice { .. } => Some(CHOICE_EQUALS_INDEX),
            QuestionKind::StructuredNumeric { .. } => Some(NUMERIC_MATCH),
            QuestionKind::StructuredPhrase { .. } => Some(PHRASE_MATCH),
            QuestionKind::Unrecognized { method, .. } => method.as_deref(),
        }
    }

    /// Decode one bank line. The error is a human-readable reason.
    pub fn from_json_line(line: &str) -> Result<Self, String> {
        let raw: RawQuestion = serde_json::from_str(line).map_err(|e| e.to_string())?;
        raw.resolve()
    }
}

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawQuestion {
    task_id: String,
    #[serde(default)]
    domain: Option<String>,
    prompt: String,
    answer_type: String,
    #[serde(default)]
    choices: Option<Vec<String>>,
    #[serde(default)]
    correct_index: Option<i64>,
    #[serde(default)]
    output_schema: Option<Value>,
    #[serde(default)]
    scoring: RawScoring,
}

#[derive(Debug, Default, Deserialize)]
struct RawScoring {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    expected_value: Option<Value>,
    #[serde(default)]
    accepted_phrases: Option<Vec<String>>,
}

impl RawQuestion {
    fn resolve(self) -> Result<Question, String> {
        if self.task_id.trim().is_empty() {
            return Err("task_id must not be empty".to_string());
        }

        let domain = self
            .domain
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());

        let kind = match (self.answer_type.as_str(), self.scoring.method.as_deref()) {
            (MULTIPLE_CHOICE, Some(CHOICE_EQUALS_INDEX)) => {
                let choices = self
                    .choices
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| "multiple_choice question needs non-empty choices".to_string())?;
                let correct_index = self
                    .correct_index
                    .ok_or_else(|| "multiple_choice question needs correct_index".to_string())?;
                if correct_index < 0 || correct_index as usize >= choices.len() {
                    return Err(format!(
                        "correct_index {correct_index} out of range for {} choices",
                        choices.len()
                    ));
                }
                QuestionKind::MultipleChoice {
                    choices,
                    correct_index,
                }
            }
            (STRUCTURED_SINGLE, Some(NUMERIC_MATCH)) => {
                let output_schema = required_schema(self.output_schema.as_ref())?;
                let expected_value = self
                    .scoring
                    .expected_value
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| "numeric_match needs scoring.expected_value".to_string())?;
                QuestionKind::StructuredNumeric {
                    output_schema,
                    expected_value,
                }
            }
            (STRUCTURED_SINGLE, Some(PHRASE_MATCH)) => {
                let output_schema = required_schema(self.output_schema.as_ref())?;
                let accepted_phrases = self
                    .scoring
                    .accepted_phrases
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| "phrase_match needs non-empty scoring.accepted_phrases".to_string())?;
                QuestionKind::StructuredPhrase {
                    output_schema,
                    accepted_phrases,
                }
            }
            _ => QuestionKind::Unrecognized {
                answer_type: self.answer_type.clone(),
                method: self.scoring.method.clone(),
                choices: self.choices,
                output_schema: self
                    .output_schema
                    .as_ref()
                    .and_then(|v| OutputSchema::from_value(v).ok()),
            },
        };

        Ok(Question {
            task_id: self.task_id,
            domain,
            prompt: self.prompt,
            kind,
        })
    }
}

fn required_schema(value: Option<&Value>) -> Result<OutputSchema, String> {
    let value = value.ok_or_else(|| "structured_single question needs output_schema".to_string())?;
    OutputSchema::from_value(value)
}
