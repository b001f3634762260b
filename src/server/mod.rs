//! HTTP surface: `/api/v1` routes over the task invokers, plus Swagger UI.

pub mod docs;
pub mod limiter;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, Method, header};
use axum::routing::{get, post};
use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::llm::ModelClient;
use crate::tasks::TaskRunner;

pub use docs::ApiDoc;
pub use limiter::RateLimiter;

/// Path of the Swagger UI.
pub const SWAGGER_PATH: &str = "/swagger";

/// Path of the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Model client shared by all requests.
pub type SharedClient = Arc<dyn ModelClient>;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TaskRunner<SharedClient>>,
    /// Per-client, per-route limit on the task routes.
    pub limiter: Arc<RateLimiter>,
    /// Per-client limits across every API route.
    pub client_limiters: Arc<Vec<RateLimiter>>,
}

impl AppState {
    pub fn new(runner: TaskRunner<SharedClient>) -> Self {
        Self {
            runner: Arc::new(runner),
            limiter: Arc::new(RateLimiter::default()),
            client_limiters: Arc::new(limiter::client_defaults()),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    pub fn with_client_limiters(mut self, limiters: Vec<RateLimiter>) -> Self {
        self.client_limiters = Arc::new(limiters);
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let tasks = Router::new()
        .route("/generate/text", post(routes::generate_text))
        .route("/generate/code", post(routes::generate_code))
        .route("/classify/text", post(routes::classify_text))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            limiter::enforce,
        ));

    let api = Router::new()
        .route("/health", get(routes::health))
        .merge(tasks)
        .route_layer(middleware::from_fn_with_state(
            state.client_limiters.clone(),
            limiter::enforce_client,
        ));

    Router::new()
        .nest("/api/v1", api)
        .merge(SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_PATH, ApiDoc::openapi()))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Listening on http://{}/api/v1", local);
    info!("API docs at http://{}{}/", local, SWAGGER_PATH);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
