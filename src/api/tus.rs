//! TUS 1.0.0 header names and request header parsing.

use crate::api::error::AppError;
use crate::utils::checksum::ChunkChecksum;
use crate::utils::metadata::{self, UploadMetadata};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use chrono::{DateTime, Utc};

pub const TUS_VERSION: &str = "1.0.0";
pub const TUS_EXTENSIONS: &str = "creation,expiration,termination,checksum";
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

pub const TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub const TUS_VERSION_HEADER: HeaderName = HeaderName::from_static("tus-version");
pub const TUS_EXTENSION: HeaderName = HeaderName::from_static("tus-extension");
pub const TUS_MAX_SIZE: HeaderName = HeaderName::from_static("tus-max-size");
pub const TUS_CHECKSUM_ALGORITHM: HeaderName = HeaderName::from_static("tus-checksum-algorithm");
pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub const UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");
pub const UPLOAD_DEFER_LENGTH: HeaderName = HeaderName::from_static("upload-defer-length");
pub const UPLOAD_EXPIRES: HeaderName = HeaderName::from_static("upload-expires");
pub const UPLOAD_CHECKSUM: HeaderName = HeaderName::from_static("upload-checksum");
pub const UPLOAD_STATUS: HeaderName = HeaderName::from_static("upload-status");
pub const UPLOAD_ARTIFACT: HeaderName = HeaderName::from_static("upload-artifact");

/// Headers a browser client needs to read from cross-origin responses.
pub const EXPOSED_HEADERS: [HeaderName; 11] = [
    TUS_RESUMABLE,
    TUS_VERSION_HEADER,
    TUS_EXTENSION,
    TUS_MAX_SIZE,
    UPLOAD_OFFSET,
    UPLOAD_LENGTH,
    UPLOAD_METADATA,
    UPLOAD_EXPIRES,
    UPLOAD_STATUS,
    UPLOAD_ARTIFACT,
    header::LOCATION,
];

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| AppError::BadRequest(format!("{} is not valid ASCII", name)))
        })
        .transpose()
}

fn parse_u64(name: &HeaderName, raw: &str) -> Result<u64, AppError> {
    // Strictly digits: no sign, no whitespace, no exponent
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!(
            "{} must be a non-negative integer",
            name
        )));
    }
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("{} is out of range", name)))
}

/// `Upload-Length` of a creation request; `None` when absent.
pub fn upload_length(headers: &HeaderMap) -> Result<Option<u64>, AppError> {
    if headers.contains_key(UPLOAD_DEFER_LENGTH) {
        return Err(AppError::BadRequest(
            "Upload-Defer-Length is not supported".to_string(),
        ));
    }
    header_str(headers, &UPLOAD_LENGTH)?
        .map(|raw| parse_u64(&UPLOAD_LENGTH, raw))
        .transpose()
}

pub fn upload_offset(headers: &HeaderMap) -> Result<u64, AppError> {
    let raw = header_str(headers, &UPLOAD_OFFSET)?
        .ok_or_else(|| AppError::BadRequest("Upload-Offset header is required".to_string()))?;
    parse_u64(&UPLOAD_OFFSET, raw)
}

pub fn upload_metadata(headers: &HeaderMap) -> Result<UploadMetadata, AppError> {
    match header_str(headers, &UPLOAD_METADATA)? {
        Some(raw) => metadata::parse(raw).map_err(|e| AppError::BadRequest(e.to_string())),
        None => Ok(UploadMetadata::new()),
    }
}

pub fn upload_checksum(headers: &HeaderMap) -> Result<Option<ChunkChecksum>, AppError> {
    header_str(headers, &UPLOAD_CHECKSUM)?
        .map(|raw| ChunkChecksum::parse(raw).map_err(|e| AppError::BadRequest(e.to_string())))
        .transpose()
}

pub fn require_offset_content_type(headers: &HeaderMap) -> Result<(), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(OFFSET_OCTET_STREAM) {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(format!(
            "Content-Type must be {}",
            OFFSET_OCTET_STREAM
        )))
    }
}

/// RFC 9110 IMF-fixdate, as used by `Upload-Expires`.
pub fn http_date(at: DateTime<Utc>) -> HeaderValue {
    let formatted = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    HeaderValue::from_str(&formatted).unwrap_or_else(|_| HeaderValue::from_static(""))
}
