//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::UpstreamError;
use crate::llm::{ModelClient, ModelRequest};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default per-request timeout (60 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request_body(request: &ModelRequest) -> serde_json::Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.params.temperature,
                "maxOutputTokens": request.params.max_output_tokens,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
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

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Extract the text payload from a successful response.
///
/// Parse failures report only the serde error category. Line and column
/// numbers could otherwise read as status codes to the retry classifier.
fn extract_text(body: &str) -> Result<String, UpstreamError> {
    let response: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        UpstreamError::new(format!(
            "Failed to parse Gemini response ({:?} error)",
            e.classify()
        ))
    })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::new("Gemini returned no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        return Err(UpstreamError::new(format!(
            "Gemini returned an empty response (finish reason: {reason})"
        )));
    }

    Ok(text)
}

/// Turn a non-success HTTP response into an upstream error.
fn error_from_response(status: u16, body: &str) -> UpstreamError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{}: {}", code, envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) => format!("Gemini API error: {}", body.trim()),
    };
    UpstreamError::with_status(status, message)
}

/// Map transport failures onto messages the retry classifier recognizes.
///
/// The URL is stripped so port numbers can't look like status codes.
fn error_from_transport(err: reqwest::Error) -> UpstreamError {
    let err = err.without_url();
    if err.is_timeout() {
        UpstreamError::new(format!("timeout: {err}"))
    } else if err.is_connect() || err.is_request() {
        UpstreamError::new(format!("connection error: {err}"))
    } else {
        UpstreamError::new(err.to_string())
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
        debug!(model = %self.model, temperature = request.params.temperature, "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&Self::build_request_body(request))
            .send()
            .await
            .map_err(error_from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(error_from_transport)?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        extract_text(&body)
    }
}
