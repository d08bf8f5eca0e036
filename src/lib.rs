use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod controller;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod sharing;
pub mod templates;

pub mod routes;
use routes::public;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use controller::{KnowledgeController, KnowledgeState, knowledge_controller};
pub use error::KnowledgeError;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::redirect_to_article,
        handlers::redirect_to_article_with_token,
        handlers::get_tree_panel_children,
        handlers::get_tree_panel,
    ),
    components(
        schemas(
            models::Article, models::ArticlePermission, models::TreePanelValues,
            models::TreePanelParams, models::TreePanelChildrenParams,
        )
    ),
    tags(
        (name = "knowledge-share", description = "Token-based public sharing of knowledge articles")
    )
)]
struct ApiDoc;

/// AppState
///
/// Immutable container of the services shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Article and profile storage.
    pub repo: RepositoryState,
    /// Controller stack deciding how article requests resolve.
    pub knowledge: KnowledgeState,
    /// The loaded configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the controller stack on top of `repo` according to `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let knowledge = knowledge_controller(repo.clone(), &config);
        Self {
            repo,
            knowledge,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, the API documentation and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Every request gets a UUID, recorded in its span and echoed back.
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by its `x-request-id`. The URI path is
/// recorded without the query string; token routes carry the token in the
/// path, so only the matched route shape is logged for them.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        path = %redact_token_path(request.uri().path()),
        req_id = %request_id,
    )
}

/// Hides the access token segment of `/knowledge/article/{id}/{token}` paths.
fn redact_token_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        ["knowledge", "article", id, _token] => format!("/knowledge/article/{id}/[redacted]"),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_token_path;

    #[test]
    fn token_segment_is_redacted() {
        assert_eq!(
            redact_token_path("/knowledge/article/4/secret"),
            "/knowledge/article/4/[redacted]"
        );
        assert_eq!(redact_token_path("/knowledge/article/4"), "/knowledge/article/4");
        assert_eq!(redact_token_path("/health"), "/health");
    }
}
