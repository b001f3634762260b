//! OpenAPI document served behind the Swagger UI.

use utoipa::OpenApi;

use super::routes;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Multi-Task LLM API",
        version = "1.0",
        description = "Text generation, code generation and text classification backed by Gemini"
    ),
    paths(
        routes::health,
        routes::generate_text,
        routes::generate_code,
        routes::classify_text,
    ),
    components(schemas(
        routes::PromptRequest,
        routes::ClassifyRequest,
        routes::TextResponse,
        routes::CodeResponse,
        routes::ClassificationResponse,
        routes::HealthResponse,
        routes::ErrorResponse,
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "generation", description = "Text and code generation"),
        (name = "classification", description = "Text classification"),
    )
)]
pub struct ApiDoc;
