mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::setup;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tus_upload_backend::{AppState, create_app};

const BASE: &str = "/api/v1/files/upload";

async fn app() -> Router {
    let ctx = setup().await;
    create_app(AppState::new(ctx.service))
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
}

async fn create(app: &Router, length: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(BASE)
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Length", length)
                .header("Upload-Metadata", "filename eHJheS5kY20=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn patch(app: &Router, location: &str, offset: u64, body: Vec<u8>) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(location)
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", offset.to_string())
                .header(header::CONTENT_TYPE, "application/offset+octet-stream")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn head(app: &Router, location: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(location)
                .header("Tus-Resumable", "1.0.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_options_advertises_capabilities() {
    let app = app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri(BASE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header_str(&response, "tus-version"), "1.0.0");
    assert_eq!(header_str(&response, "tus-resumable"), "1.0.0");
    assert_eq!(header_str(&response, "tus-max-size"), "1048576");
    assert!(header_str(&response, "tus-extension").contains("termination"));
    assert_eq!(
        header_str(&response, "tus-checksum-algorithm"),
        "sha256,sha512"
    );
}

#[tokio::test]
async fn test_full_upload_over_http() {
    let app = app().await;

    let response = create(&app, "10").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header_str(&response, "upload-offset"), "0");
    assert!(header_str(&response, "upload-expires").ends_with("GMT"));
    let location = header_str(&response, "location").to_string();
    assert!(location.starts_with(BASE));

    let response = patch(&app, &location, 0, b"hello".to_vec()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header_str(&response, "upload-offset"), "5");

    let response = head(&app, &location).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "upload-offset"), "5");
    assert_eq!(header_str(&response, "upload-length"), "10");
    assert_eq!(header_str(&response, "upload-metadata"), "filename eHJheS5kY20=");
    assert_eq!(header_str(&response, "cache-control"), "no-store");

    let response = patch(&app, &location, 5, b"world".to_vec()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header_str(&response, "upload-offset"), "10");
    assert_eq!(header_str(&response, "upload-status"), "completed");
    assert!(header_str(&response, "upload-artifact").starts_with("mem://"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&location)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["received_length"], 10);
    assert_eq!(json["metadata"]["filename"], "xray.dcm");

    let response = patch(&app, &location, 10, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_conflict_reports_committed_offset() {
    let app = app().await;
    let response = create(&app, "10").await;
    let location = header_str(&response, "location").to_string();
    patch(&app, &location, 0, b"abc".to_vec()).await;

    let response = patch(&app, &location, 0, b"abc".to_vec()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(header_str(&response, "upload-offset"), "3");
}

#[tokio::test]
async fn test_oversize_chunk_is_payload_too_large() {
    let app = app().await;
    let response = create(&app, "4").await;
    let location = header_str(&response, "location").to_string();

    let response = patch(&app, &location, 0, b"too long".to_vec()).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(header_str(&response, "upload-offset"), "0");
}

#[tokio::test]
async fn test_protocol_errors() {
    let app = app().await;

    // Missing Tus-Resumable
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(BASE)
                .header("Upload-Length", "10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(header_str(&response, "tus-version"), "1.0.0");

    let response = create(&app, "0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = create(&app, "abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = create(&app, "10").await;
    let location = header_str(&response, "location").to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "0")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "0")
                .header("Upload-Checksum", "sha256 AAAA")
                .header(header::CONTENT_TYPE, "application/offset+octet-stream")
                .body(Body::from("data"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 460);

    let response = head(&app, &format!("{}/not-a-uuid", BASE)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_terminates_upload() {
    let app = app().await;
    let response = create(&app, "10").await;
    let location = header_str(&response, "location").to_string();

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(&location)
            .header("Tus-Resumable", "1.0.0")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = head(&app, &location).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "upload-status"), "aborted");

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    let response = patch(&app, &location, 0, b"x".to_vec()).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_health_reports_dependencies() {
    let app = app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
    assert_eq!(json["storage"], "connected");
}
