//! Model client.
//!
//! Renders a question into a chat request, sends it to an OpenAI-compatible
//! chat-completions endpoint and turns whatever comes back into an
//! [`AnswerOutcome`]. The client never retries and keeps no state between
//! calls; retry policy belongs to the driver.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::question::{OutputSchema, Question, QuestionKind};

/// Fixed system instruction sent with every question.
pub const SYSTEM_INSTRUCTION: &str = "Answer in JSON only. No extra text. Use the schema given.";

/// Chat-completions endpoint of a locally hosted model server.
pub const DEFAULT_API_URL: &str = "http://localhost:11434/v1/chat/completions";

/// Root URL probed by the health check.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const CHOICE_SCHEMA_HINT: &str = r#"{"choice": <integer>}"#;

/// Structured answer: field name to value, in the order the model emitted them.
pub type Answer = serde_json::Map<String, Value>;

/// What came back from one `ask`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    /// The model replied with a non-empty JSON object.
    Answered(Answer),
    /// The endpoint could not be reached, timed out, or returned a non-2xx
    /// status or an unexpected body.
    TransportFailure { cause: String },
    /// The model replied, but the reply is not a JSON object.
    MalformedAnswer { raw: String, cause: String },
}

impl AnswerOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, AnswerOutcome::Answered(_))
    }

    /// Short label for logs and scoring reasons.
    pub fn kind_label(&self) -> &'static str {
        match self {
            AnswerOutcome::Answered(_) => "answered",
            AnswerOutcome::TransportFailure { .. } => "transport failure",
            AnswerOutcome::MalformedAnswer { .. } => "malformed answer",
        }
    }
}

/// Sends one rendered prompt to one model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn ask(&self, prompt: &str, model: &str, temperature: f64) -> AnswerOutcome;
}

// ---------------------------------------------------------------------------
// Prompt rendering and answer parsing
// ---------------------------------------------------------------------------

/// Build the user message for a question: the prompt text followed by the
/// choice list (if any) and the expected response shape.
pub fn render_prompt(question: &Question) -> String {
    match &question.kind {
        QuestionKind::MultipleChoice { choices, .. } => render_choices(&question.prompt, choices),
        QuestionKind::StructuredNumeric { output_schema, .. }
        | QuestionKind::StructuredPhrase { output_schema, .. } => {
            render_schema(&question.prompt, output_schema)
        }
        QuestionKind::Unrecognized {
            choices,
            output_schema,
            ..
        } => match (choices, output_schema) {
            (Some(choices), _) if !choices.is_empty() => render_choices(&question.prompt, choices),
            (_, Some(schema)) => render_schema(&question.prompt, schema),
            _ => format!("{}\n\nAnswer with a JSON object.", question.prompt),
        },
    }
}

fn render_choices(prompt: &str, choices: &[String]) -> String {
    let listing = choices
        .iter()
        .enumerate()
        .map(|(idx, choice)| format!("{idx}) {choice}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{prompt}\n\nChoices:\n{listing}\n\nAnswer with JSON using this schema:\n{CHOICE_SCHEMA_HINT}"
    )
}

fn render_schema(prompt: &str, schema: &OutputSchema) -> String {
    format!(
        "{prompt}\n\nAnswer with JSON using this schema:\n{}",
        schema.hint()
    )
}

/// Trim `text` and remove markdown code fences. The opening fence (with an
/// optional language tag) and the closing fence are stripped independently.
pub fn strip_code_fence(text: &str) -> &str {
    let mut rest = text.trim();
    if let Some(after) = rest.strip_prefix("```") {
        let tag_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(after.len());
        let next = after[tag_len..].chars().next();
        rest = match next {
            None => "",
            Some(c) if c.is_whitespace() || c == '{' || c == '[' => &after[tag_len..],
            Some(_) => after,
        };
    }
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Interpret raw model text as a structured answer.
pub fn parse_answer(raw: &str) -> AnswerOutcome {
    let malformed = |cause: String| AnswerOutcome::MalformedAnswer {
        raw: raw.to_string(),
        cause,
    };

    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(Value::Object(map)) if !map.is_empty() => AnswerOutcome::Answered(map),
        Ok(Value::Object(_)) => malformed("answer object has no fields".to_string()),
        Ok(other) => malformed(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => malformed(format!("invalid JSON: {e}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Endpoint configuration for [`HttpModelClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chat-completions URL requests are POSTed to.
    pub api_url: String,
    /// Server root used by [`HttpModelClient::check_server`].
    pub base_url: String,
    /// Upper bound on one `ask`.
    pub timeout: Duration,
    /// Upper bound on the health probe.
    pub health_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`ModelClient`] over an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("knowbench/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Probe the server root. Any HTTP response counts as reachable.
    pub async fn check_server(&self) -> Result<(), ClientError> {
        let url = &self.config.base_url;
        match self
            .http
            .get(url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "model server reachable");
                Ok(())
            }
            Err(e) => Err(ClientError::Unreachable {
                url: url.clone(),
                cause: e.to_string(),
            }),
        }
    }

    async fn fetch_content(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
    ) -> Result<String, String> {
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            stream: false,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.describe(e))?;

        let response = response.error_for_status().map_err(|e| self.describe(e))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable response body: {e}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "response has no choices[0].message.content".to_string())
    }

    fn describe(&self, err: reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {:?}", self.config.timeout)
        } else if let Some(status) = err.status() {
            format!("endpoint returned {status}")
        } else {
            err.to_string()
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn ask(&self, prompt: &str, model: &str, temperature: f64) -> AnswerOutcome {
        match self.fetch_content(prompt, model, temperature).await {
            Ok(raw) => parse_answer(&raw),
            Err(cause) => AnswerOutcome::TransportFailure { cause },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_plain_text_untouched() {
        assert_eq!(strip_code_fence("  {\"choice\": 2}\n"), "{\"choice\": 2}");
    }

    #[test]
    fn test_strip_json_fence() {
        let raw = "```json\n{\"choice\": 2}\n```";
        assert_eq!(strip_code_fence(raw), "{\"choice\": 2}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_unterminated_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_tag_glued_to_body() {
        assert_eq!(strip_code_fence("```json{\"choice\": 2}```"), "{\"choice\": 2}");
        assert_eq!(strip_code_fence("```json[1]\n```"), "[1]");
    }

    #[test]
    fn test_strip_closing_fence_without_opening() {
        assert_eq!(strip_code_fence("{\"choice\": 2}\n```"), "{\"choice\": 2}");
    }

    #[test]
    fn test_parse_answer_glued_and_dangling_fences() {
        let mut expected = Answer::new();
        expected.insert("choice".into(), json!(2));
        for raw in ["```json{\"choice\": 2}```", "{\"choice\": 2}\n```"] {
            assert_eq!(parse_answer(raw), AnswerOutcome::Answered(expected.clone()));
        }
    }

    #[test]
    fn test_parse_answer_object() {
        let outcome = parse_answer("```json\n{\"answer\": \"xtreg, fe\"}\n```");
        let mut expected = Answer::new();
        expected.insert("answer".into(), json!("xtreg, fe"));
        assert_eq!(outcome, AnswerOutcome::Answered(expected));
    }

    #[test]
    fn test_parse_answer_keeps_field_order() {
        match parse_answer(r#"{"zeta": 1, "alpha": 2}"#) {
            AnswerOutcome::Answered(map) => {
                let keys: Vec<_> = map.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["zeta", "alpha"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_answer_rejects_non_objects() {
        for raw in ["not json at all", "[1, 2]", "42", "{}", ""] {
            match parse_answer(raw) {
                AnswerOutcome::MalformedAnswer { raw: kept, .. } => assert_eq!(kept, raw),
                other => panic!("expected MalformedAnswer for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_render_multiple_choice_prompt() {
        let q = Question::multiple_choice(
            "mc_001",
            "syntax",
            "Which command fits a logit?",
            vec!["reg".into(), "logit".into()],
            1,
        );
        let prompt = render_prompt(&q);
        assert_eq!(
            prompt,
            "Which command fits a logit?\n\nChoices:\n0) reg\n1) logit\n\nAnswer with JSON using this schema:\n{\"choice\": <integer>}"
        );
    }

    #[test]
    fn test_render_structured_prompt() {
        let q = Question::numeric(
            "num_001",
            "math",
            "How many?",
            OutputSchema::new(vec![("count".into(), "integer".into())]),
            json!(4),
        );
        let prompt = render_prompt(&q);
        assert!(prompt.starts_with("How many?\n\nAnswer with JSON using this schema:\n"));
        assert!(prompt.ends_with(r#"{"count":"integer"}"#));
    }

    #[test]
    fn test_render_unrecognized_without_shape() {
        let q = Question {
            task_id: "x".into(),
            domain: "misc".into(),
            prompt: "Explain.".into(),
            kind: QuestionKind::Unrecognized {
                answer_type: "free_text".into(),
                method: None,
                choices: None,
                output_schema: None,
            },
        };
        assert_eq!(render_prompt(&q), "Explain.\n\nAnswer with a JSON object.");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gemma3:4b",
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.5,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gemma3:4b",
                "messages": [
                    {"role": "system", "content": SYSTEM_INSTRUCTION},
                    {"role": "user", "content": "hi"}
                ],
                "temperature": 0.5,
                "stream": false
            })
        );
    }
}
