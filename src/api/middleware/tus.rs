use crate::api::error::AppError;
use crate::api::tus::{TUS_RESUMABLE, TUS_VERSION, TUS_VERSION_HEADER};
use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Rejects protocol requests that don't speak TUS 1.0.0 and stamps
/// `Tus-Resumable` on every response.
///
/// OPTIONS is exempt so clients can discover the supported versions.
pub async fn tus_resumable_middleware(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        let version = req
            .headers()
            .get(TUS_RESUMABLE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);

        if version != Some(TUS_VERSION) {
            let mut response = AppError::PreconditionFailed(format!(
                "Tus-Resumable must be {}",
                TUS_VERSION
            ))
            .into_response();
            response
                .headers_mut()
                .insert(TUS_VERSION_HEADER, HeaderValue::from_static(TUS_VERSION));
            return response;
        }
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));
    response
}
