pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::tus::EXPOSED_HEADERS;
use crate::config::UploadConfig;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::options_handler,
        api::handlers::upload::create_upload_handler,
        api::handlers::upload::head_upload_handler,
        api::handlers::upload::patch_upload_handler,
        api::handlers::upload::abort_upload_handler,
        api::handlers::upload::get_upload_handler,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            services::upload_service::UploadInfo,
            services::upload_service::CreatedUpload,
            services::upload_service::PatchOutcome,
            services::completion::UploadCompleted,
            entities::upload_sessions::UploadStatus,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "uploads", description = "TUS 1.0.0 resumable upload endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub upload_service: Arc<UploadService>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(upload_service: Arc<UploadService>) -> Self {
        let config = upload_service.config().clone();
        Self {
            upload_service,
            config,
        }
    }
}

fn cors_layer(config: &UploadConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(EXPOSED_HEADERS)
}

pub fn create_app(state: AppState) -> Router {
    let uploads = Router::new()
        .route(
            "/",
            post(api::handlers::upload::create_upload_handler)
                .options(api::handlers::upload::options_handler),
        )
        .route(
            "/:upload_id",
            get(api::handlers::upload::get_upload_handler)
                .head(api::handlers::upload::head_upload_handler)
                .patch(api::handlers::upload::patch_upload_handler)
                .delete(api::handlers::upload::abort_upload_handler),
        )
        .layer(from_fn(api::middleware::tus::tus_resumable_middleware))
        .layer(DefaultBodyLimit::max(state.config.max_chunk_size));

    let base_path = state.config.upload_base_path.clone();
    let router = if base_path.is_empty() {
        Router::new().merge(uploads)
    } else {
        Router::new().nest(&base_path, uploads)
    };

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
