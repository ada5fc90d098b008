use crate::AppState;
use crate::api::error::AppError;
use crate::api::tus::{
    self, TUS_CHECKSUM_ALGORITHM, TUS_EXTENSION, TUS_EXTENSIONS, TUS_MAX_SIZE, TUS_VERSION,
    TUS_VERSION_HEADER, UPLOAD_ARTIFACT, UPLOAD_EXPIRES, UPLOAD_LENGTH, UPLOAD_METADATA,
    UPLOAD_OFFSET, UPLOAD_STATUS,
};
use crate::services::upload_service::{CreateUpload, UploadInfo};
use crate::utils::{checksum, metadata};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
};
use uuid::Uuid;

fn parse_session_id(upload_id: &str) -> Result<Uuid, AppError> {
    // Unknown and malformed ids look the same to the client
    Uuid::parse_str(upload_id)
        .map_err(|_| AppError::NotFound(format!("Upload session {} not found", upload_id)))
}

fn status_headers(info: &UploadInfo) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(UPLOAD_OFFSET, HeaderValue::from(info.received_length));
    headers.insert(UPLOAD_LENGTH, HeaderValue::from(info.declared_length));
    headers.insert(UPLOAD_STATUS, HeaderValue::from_static(info.status.as_str()));
    if !info.status.is_terminal() {
        headers.insert(UPLOAD_EXPIRES, tus::http_date(info.expires_at));
    }
    headers
}

#[utoipa::path(
    options,
    path = "/api/v1/files/upload",
    responses(
        (status = 204, description = "TUS capabilities in Tus-Version, Tus-Extension, Tus-Max-Size and Tus-Checksum-Algorithm headers")
    ),
    tag = "uploads"
)]
pub async fn options_handler(State(state): State<AppState>) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    headers.insert(TUS_VERSION_HEADER, HeaderValue::from_static(TUS_VERSION));
    headers.insert(TUS_EXTENSION, HeaderValue::from_static(TUS_EXTENSIONS));
    headers.insert(
        TUS_MAX_SIZE,
        HeaderValue::from(state.config.max_upload_size),
    );
    headers.insert(
        TUS_CHECKSUM_ALGORITHM,
        HeaderValue::from_static(checksum::SUPPORTED_ALGORITHMS),
    );
    (StatusCode::NO_CONTENT, headers)
}

#[utoipa::path(
    post,
    path = "/api/v1/files/upload",
    params(
        ("Upload-Length" = u64, Header, description = "Total size of the upload in bytes"),
        ("Upload-Metadata" = Option<String>, Header, description = "Comma separated `key base64(value)` pairs"),
        ("Tus-Resumable" = String, Header, description = "Protocol version, must be 1.0.0")
    ),
    responses(
        (status = 201, description = "Upload session created, see Location"),
        (status = 400, description = "Missing or invalid Upload-Length or metadata"),
        (status = 412, description = "Unsupported protocol version"),
        (status = 503, description = "Chunk store unavailable")
    ),
    tag = "uploads"
)]
pub async fn create_upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap), AppError> {
    let req = CreateUpload {
        declared_length: tus::upload_length(&headers)?,
        metadata: tus::upload_metadata(&headers)?,
    };

    let created = state.upload_service.create(req).await?;

    let mut response_headers = status_headers(&created.info);
    let location = HeaderValue::from_str(&created.location)
        .map_err(|_| AppError::Internal(format!("Invalid location: {}", created.location)))?;
    response_headers.insert(header::LOCATION, location);

    Ok((StatusCode::CREATED, response_headers))
}

#[utoipa::path(
    head,
    path = "/api/v1/files/upload/{upload_id}",
    params(
        ("upload_id" = String, Path, description = "Upload Session ID")
    ),
    responses(
        (status = 200, description = "Committed offset in Upload-Offset, total in Upload-Length"),
        (status = 404, description = "Unknown upload session")
    ),
    tag = "uploads"
)]
pub async fn head_upload_handler(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<(StatusCode, HeaderMap), AppError> {
    let session_id = parse_session_id(&upload_id)?;
    let info = state.upload_service.head(session_id).await?;

    let mut headers = status_headers(&info);
    if !info.metadata.is_empty() {
        let encoded = HeaderValue::from_str(&metadata::encode(&info.metadata))
            .map_err(|_| AppError::Internal("Unencodable upload metadata".to_string()))?;
        headers.insert(UPLOAD_METADATA, encoded);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((StatusCode::OK, headers))
}

#[utoipa::path(
    patch,
    path = "/api/v1/files/upload/{upload_id}",
    request_body(content = Vec<u8>, description = "Chunk data", content_type = "application/offset+octet-stream"),
    params(
        ("upload_id" = String, Path, description = "Upload Session ID"),
        ("Upload-Offset" = u64, Header, description = "Offset the client believes is committed"),
        ("Upload-Checksum" = Option<String>, Header, description = "`sha256|sha512 <base64 digest>` of the body")
    ),
    responses(
        (status = 204, description = "Chunk committed; new offset in Upload-Offset, Upload-Artifact set on completion"),
        (status = 404, description = "Unknown upload session"),
        (status = 409, description = "Offset conflict; committed offset in Upload-Offset"),
        (status = 410, description = "Upload is completed, failed or aborted"),
        (status = 413, description = "Chunk exceeds the declared length"),
        (status = 415, description = "Wrong Content-Type"),
        (status = 423, description = "Another request holds the session"),
        (status = 460, description = "Checksum mismatch"),
        (status = 503, description = "Chunk store failure, retry from Upload-Offset")
    ),
    tag = "uploads"
)]
pub async fn patch_upload_handler(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, HeaderMap), AppError> {
    let session_id = parse_session_id(&upload_id)?;
    tus::require_offset_content_type(&headers)?;
    let claimed_offset = tus::upload_offset(&headers)?;
    let checksum = tus::upload_checksum(&headers)?;

    let outcome = state
        .upload_service
        .patch(session_id, claimed_offset, body, checksum.as_ref())
        .await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(UPLOAD_OFFSET, HeaderValue::from(outcome.received_length));
    response_headers.insert(
        UPLOAD_STATUS,
        HeaderValue::from_static(outcome.status.as_str()),
    );
    if let Some(artifact) = &outcome.artifact_reference
        && let Ok(value) = HeaderValue::from_str(artifact)
    {
        response_headers.insert(UPLOAD_ARTIFACT, value);
    }

    Ok((StatusCode::NO_CONTENT, response_headers))
}

#[utoipa::path(
    delete,
    path = "/api/v1/files/upload/{upload_id}",
    params(
        ("upload_id" = String, Path, description = "Upload Session ID")
    ),
    responses(
        (status = 204, description = "Upload aborted"),
        (status = 404, description = "Unknown upload session"),
        (status = 410, description = "Upload already completed, failed or aborted")
    ),
    tag = "uploads"
)]
pub async fn abort_upload_handler(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session_id = parse_session_id(&upload_id)?;
    state.upload_service.abort(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/files/upload/{upload_id}",
    params(
        ("upload_id" = String, Path, description = "Upload Session ID")
    ),
    responses(
        (status = 200, description = "Upload session details", body = UploadInfo),
        (status = 404, description = "Unknown upload session")
    ),
    tag = "uploads"
)]
pub async fn get_upload_handler(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadInfo>, AppError> {
    let session_id = parse_session_id(&upload_id)?;
    let info = state.upload_service.head(session_id).await?;
    Ok(Json(info))
}
