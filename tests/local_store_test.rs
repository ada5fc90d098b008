mod common;

use bytes::Bytes;
use common::{setup_test_db, test_config};
use std::sync::Arc;
use tus_upload_backend::entities::upload_sessions::UploadStatus;
use tus_upload_backend::services::chunk_store::{ChunkStore, LocalChunkStore};
use tus_upload_backend::services::completion::LoggingCompletionHook;
use tus_upload_backend::services::upload_service::{CreateUpload, UploadService};

#[tokio::test]
async fn test_local_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalChunkStore::new(dir.path()).await.unwrap();
    assert!(store.health_check().await);

    let key = store.allocate().await.unwrap();
    assert_eq!(
        store.append(&key, 0, Bytes::from_static(b"lab ")).await.unwrap(),
        4
    );
    assert_eq!(
        store.append(&key, 4, Bytes::from_static(b"result")).await.unwrap(),
        10
    );

    let reference = store.finalize(&key).await.unwrap();
    assert!(reference.starts_with("file://"));
    let path = store.root().join("complete").join(&key);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"lab result");

    // Finalizing again yields the same artifact
    assert_eq!(store.finalize(&key).await.unwrap(), reference);
    assert!(!store.root().join("partial").join(&key).exists());
}

#[tokio::test]
async fn test_local_store_abort_and_bad_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalChunkStore::new(dir.path()).await.unwrap();

    let key = store.allocate().await.unwrap();
    store
        .append(&key, 0, Bytes::from_static(b"partial"))
        .await
        .unwrap();
    store.abort(&key).await.unwrap();
    assert!(!store.root().join("partial").join(&key).exists());

    // Discarding twice is harmless
    store.abort(&key).await.unwrap();
    assert!(store.append(&key, 0, Bytes::from_static(b"x")).await.is_err());
    assert!(store.finalize(&key).await.is_err());

    assert!(
        store
            .append("../../etc/passwd", 0, Bytes::from_static(b"x"))
            .await
            .is_err()
    );
    assert!(store.abort("not-a-key").await.is_err());
}

#[tokio::test]
async fn test_local_store_replaces_unacknowledged_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalChunkStore::new(dir.path()).await.unwrap();
    let key = store.allocate().await.unwrap();
    let path = store.root().join("partial").join(&key);

    // Bytes written by a request whose acknowledgement never landed
    assert_eq!(
        store.append(&key, 0, Bytes::from_static(b"orphan")).await.unwrap(),
        6
    );

    // The registry still says 0, so the retry overwrites them
    assert_eq!(
        store.append(&key, 0, Bytes::from_static(b"ab")).await.unwrap(),
        2
    );
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ab");

    assert_eq!(
        store.append(&key, 2, Bytes::from_static(b"cd")).await.unwrap(),
        4
    );
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcd");

    // An object behind the committed offset cannot be resumed
    assert!(store.append(&key, 9, Bytes::from_static(b"x")).await.is_err());
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcd");
}

#[tokio::test]
async fn test_upload_service_on_local_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalChunkStore::new(dir.path()).await.unwrap());
    let service = UploadService::new(
        setup_test_db().await,
        store.clone(),
        Arc::new(LoggingCompletionHook),
        test_config(),
    );

    let created = service
        .create(CreateUpload {
            declared_length: Some(8),
            metadata: Default::default(),
        })
        .await
        .unwrap();
    let id = created.session_id;

    service
        .patch(id, 0, Bytes::from_static(b"dico"), None)
        .await
        .unwrap();
    let outcome = service
        .patch(id, 4, Bytes::from_static(b"m-01"), None)
        .await
        .unwrap();
    assert_eq!(outcome.status, UploadStatus::Completed);

    let session = service.registry().get(id).await.unwrap().unwrap();
    let path = store.root().join("complete").join(&session.storage_key);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"dicom-01");
    assert_eq!(
        outcome.artifact_reference.as_deref(),
        Some(format!("file://{}", path.display()).as_str())
    );
}
