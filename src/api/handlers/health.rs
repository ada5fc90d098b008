use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Registry and chunk store reachable", body = HealthResponse),
        (status = 503, description = "Registry or chunk store unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.upload_service.registry().ping().await;
    let storage_ok = state.upload_service.store().health_check().await;

    let describe = |ok: bool| {
        let label = if ok { "connected" } else { "disconnected" };
        label.to_string()
    };
    let (status, summary) = if db_ok && storage_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: summary.to_string(),
            database: describe(db_ok),
            storage: describe(storage_ok),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
