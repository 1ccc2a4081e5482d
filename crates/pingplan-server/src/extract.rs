use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::TaskRecord;

const EXTRACT_PROMPT: &str = include_str!("../prompts/extract_task.md");
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Turns free text into a task. Every failure mode looks like "not a task" to the caller.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str) -> Option<TaskRecord>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction service not configured (missing GEMINI_API_KEY)")]
    NotConfigured,
    #[error("extraction request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("extraction response had no text")]
    EmptyResponse,
    #[error("model classified the message as not a task")]
    NotATask,
    #[error("model output is not valid task json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("model output has no task description")]
    MissingDescription,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiExtractor {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiExtractor {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            model,
            api_key,
        }
    }

    async fn generate(&self, text: &str) -> Result<String, ExtractError> {
        #[derive(Debug, Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Debug, Deserialize)]
        struct Candidate {
            content: Option<Content>,
        }
        #[derive(Debug, Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }
        #[derive(Debug, Deserialize)]
        struct Part {
            text: Option<String>,
        }

        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ExtractError::NotConfigured);
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(text) }] }]
        });

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("gemini generateContent request")
            .map_err(ExtractError::Transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Transport(anyhow::anyhow!(
                "gemini API error {status}: {text}"
            )));
        }

        let resp: Resp = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("gemini generateContent decode")
            .map_err(ExtractError::Transport)?;

        let text: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Extractor for GeminiExtractor {
    async fn extract(&self, text: &str) -> Option<TaskRecord> {
        let outcome = match self.generate(text).await {
            Ok(raw) => {
                debug!(raw = %raw, "gemini response");
                parse_model_output(&raw)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(task) => Some(task),
            Err(ExtractError::NotATask) => {
                info!(text = %text, "message classified as non-task");
                None
            }
            Err(err) => {
                warn!(error = %err, "task extraction failed");
                None
            }
        }
    }
}

pub fn build_prompt(user_message: &str) -> String {
    format!("{EXTRACT_PROMPT}\n\nUser message: \"{user_message}\"\nYour response:")
}

static FENCE_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\n?").expect("fence open regex"));

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    if !s.starts_with("```") {
        return s;
    }
    let s = match FENCE_OPEN_RE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    s.trim_end().trim_end_matches("```").trim()
}

/// Interprets the model's reply: `null`, or a JSON object describing one task.
pub fn parse_model_output(raw: &str) -> Result<TaskRecord, ExtractError> {
    #[derive(Debug, Deserialize)]
    struct Extracted {
        #[serde(alias = "description", default)]
        task_description: Option<String>,
        #[serde(default)]
        deadline: Option<String>,
        #[serde(alias = "project", default)]
        project_name: Option<String>,
    }

    let body = strip_code_fence(raw);
    if body.eq_ignore_ascii_case("null") {
        return Err(ExtractError::NotATask);
    }

    let parsed: Extracted = serde_json::from_str(body)?;
    TaskRecord::new(
        parsed.task_description.as_deref().unwrap_or(""),
        parsed.deadline.as_deref().unwrap_or(""),
        parsed.project_name.as_deref().unwrap_or(""),
    )
    .ok_or(ExtractError::MissingDescription)
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    const MODEL: &str = "gemini-1.5-flash";
    const KEY: &str = "test-key";
    const MESSAGE: &str = "Submit the report by Friday";

    #[derive(Clone)]
    struct MockGemini {
        status: StatusCode,
        body: Value,
    }

    async fn mock_generate(
        State(mock): State<MockGemini>,
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(req): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if call != format!("{MODEL}:generateContent") {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown call" })));
        }
        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some(KEY) {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
        }
        let prompt = req["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        if prompt != build_prompt(MESSAGE) {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad prompt" })));
        }
        (mock.status, Json(mock.body))
    }

    async fn serve_mock(status: StatusCode, body: Value) -> String {
        let app = Router::new()
            .route("/v1beta/models/{call}", post(mock_generate))
            .with_state(MockGemini { status, body });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn extractor(base_url: String, api_key: &str) -> GeminiExtractor {
        GeminiExtractor::new(
            reqwest::Client::new(),
            base_url,
            MODEL.to_string(),
            Some(api_key.to_string()),
        )
    }

    fn candidate(parts: &[&str]) -> Value {
        let parts: Vec<Value> = parts.iter().map(|t| json!({ "text": t })).collect();
        json!({ "candidates": [{ "content": { "role": "model", "parts": parts } }] })
    }

    #[test]
    fn prompt_wraps_user_message() {
        let prompt = build_prompt("buy milk");
        assert!(prompt.starts_with("You are PingPlan"));
        assert!(prompt.ends_with("User message: \"buy milk\"\nYour response:"));
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\nnull\n```"), "null");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn null_means_not_a_task() {
        assert!(matches!(
            parse_model_output("null"),
            Err(ExtractError::NotATask)
        ));
        assert!(matches!(
            parse_model_output("```\nNULL\n```"),
            Err(ExtractError::NotATask)
        ));
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "```json\n{\"task_description\": \"Submit the physics report\", \"deadline\": \"Sunday at 9pm\", \"project_name\": \"physics\"}\n```";
        let task = parse_model_output(raw).unwrap();
        assert_eq!(task, TaskRecord::new("Submit the physics report", "Sunday at 9pm", "physics").unwrap());
    }

    #[test]
    fn accepts_short_field_names_and_missing_optionals() {
        let task = parse_model_output(r#"{"description": "finish the slides", "project": "Marketing"}"#)
            .unwrap();
        assert_eq!(task.description, "finish the slides");
        assert_eq!(task.deadline, "");
        assert_eq!(task.project, "Marketing");
    }

    #[test]
    fn empty_or_missing_description_is_rejected() {
        assert!(matches!(
            parse_model_output(r#"{"task_description": "  ", "deadline": "", "project_name": ""}"#),
            Err(ExtractError::MissingDescription)
        ));
        assert!(matches!(
            parse_model_output(r#"{"deadline": "Friday", "project_name": null}"#),
            Err(ExtractError::MissingDescription)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_model_output("Sure! Here's your task."),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_api_key_yields_none() {
        let extractor = GeminiExtractor::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9".to_string(),
            "gemini-1.5-flash".to_string(),
            None,
        );
        assert_eq!(extractor.extract("Submit the report by Friday").await, None);
    }

    #[tokio::test]
    async fn unreachable_service_yields_none() {
        let extractor = GeminiExtractor::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9".to_string(),
            "gemini-1.5-flash".to_string(),
            Some("test-key".to_string()),
        );
        assert_eq!(extractor.extract("Submit the report by Friday").await, None);
    }

    #[tokio::test]
    async fn fenced_candidate_becomes_task() {
        let base = serve_mock(
            StatusCode::OK,
            candidate(&[
                "```json\n{\"task_description\": \"Submit the report\", ",
                "\"deadline\": \"Friday\", \"project_name\": \"\"}\n```",
            ]),
        )
        .await;
        let task = extractor(base, KEY).extract(MESSAGE).await;
        assert_eq!(task, TaskRecord::new("Submit the report", "Friday", ""));
    }

    #[tokio::test]
    async fn null_candidate_is_not_a_task() {
        let base = serve_mock(StatusCode::OK, candidate(&["null"])).await;
        assert_eq!(extractor(base, KEY).extract(MESSAGE).await, None);
    }

    #[tokio::test]
    async fn server_error_yields_none() {
        let base = serve_mock(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": { "code": 500, "message": "internal" } }),
        )
        .await;
        let ex = extractor(base, KEY);
        let err = ex.generate(MESSAGE).await.unwrap_err();
        assert!(matches!(err, ExtractError::Transport(_)));
        assert!(err.to_string().contains("500"));
        assert_eq!(ex.extract(MESSAGE).await, None);
    }

    #[tokio::test]
    async fn no_candidates_yields_none() {
        let base = serve_mock(StatusCode::OK, json!({ "candidates": [] })).await;
        let ex = extractor(base, KEY);
        assert!(matches!(
            ex.generate(MESSAGE).await,
            Err(ExtractError::EmptyResponse)
        ));
        assert_eq!(ex.extract(MESSAGE).await, None);
    }

    #[tokio::test]
    async fn api_key_is_sent_as_header() {
        let base = serve_mock(StatusCode::OK, candidate(&["null"])).await;
        let err = extractor(base, "wrong-key")
            .generate(MESSAGE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(!err.to_string().contains("wrong-key"));
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_api_key() {
        let key = "SECRET-KEY-123";
        let err = extractor("http://127.0.0.1:9".to_string(), key)
            .generate(MESSAGE)
            .await
            .unwrap_err();
        let logged = err.to_string();
        assert!(matches!(err, ExtractError::Transport(_)));
        assert!(!logged.contains(key), "{logged}");
        assert!(!format!("{err:?}").contains(key));
    }
}
