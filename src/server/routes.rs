//! Route handlers and their JSON bodies.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::error::{TaskError, TaskErrorKind};

use super::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PromptRequest {
    /// Instruction sent to the model.
    #[schema(example = "Write a short poem about autumn")]
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClassifyRequest {
    /// Text to classify.
    #[schema(example = "I love this amazing product! It works perfectly.")]
    pub text: Option<String>,
    /// Candidate labels, in order of preference.
    #[schema(example = json!(["positive", "negative", "neutral"]))]
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TextResponse {
    pub generated_text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CodeResponse {
    pub generated_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassificationResponse {
    pub classification: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response: `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match err.kind() {
            TaskErrorKind::Validation => StatusCode::BAD_REQUEST,
            TaskErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            TaskErrorKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if err.kind() == TaskErrorKind::Upstream {
            error!(error = %err, "Task failed");
        } else {
            warn!(error = %err, "Task rejected");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Multi-Task LLM API is running".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/generate/text",
    tag = "generation",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "Generated text", body = TextResponse),
        (status = 400, description = "Missing or empty prompt", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse),
    )
)]
pub async fn generate_text(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<TextResponse>, ApiError> {
    let Json(body) = payload?;
    let prompt = body.prompt.unwrap_or_default();

    let generated_text = state.runner.generate_text(&prompt).await?;
    Ok(Json(TextResponse { generated_text }))
}

#[utoipa::path(
    post,
    path = "/api/v1/generate/code",
    tag = "generation",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "Generated code", body = CodeResponse),
        (status = 400, description = "Missing or empty prompt", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse),
    )
)]
pub async fn generate_code(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>, ApiError> {
    let Json(body) = payload?;
    let prompt = body.prompt.unwrap_or_default();

    let generated_code = state.runner.generate_code(&prompt).await?;
    Ok(Json(CodeResponse { generated_code }))
}

#[utoipa::path(
    post,
    path = "/api/v1/classify/text",
    tag = "classification",
    request_body = ClassifyRequest,
    responses(
        (status = 200, description = "One of the given categories", body = ClassificationResponse),
        (status = 400, description = "Missing text or categories", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse),
    )
)]
pub async fn classify_text(
    State(state): State<AppState>,
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassificationResponse>, ApiError> {
    let Json(body) = payload?;

    let (Some(text), Some(categories)) = (body.text, body.categories) else {
        return Err(ApiError::bad_request("Text and categories are required"));
    };
    if text.is_empty() || categories.is_empty() {
        return Err(ApiError::bad_request("Text and categories are required"));
    }

    let classification = state.runner.classify_text(&text, &categories).await?;
    Ok(Json(ClassificationResponse { classification }))
}
