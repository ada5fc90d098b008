#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tus_upload_backend::config::UploadConfig;
use tus_upload_backend::infrastructure::database::run_migrations;
use tus_upload_backend::services::chunk_store::ChunkStore;
use tus_upload_backend::services::completion::{ChannelCompletionHook, UploadCompleted};
use tus_upload_backend::services::upload_service::UploadService;
use uuid::Uuid;

/// In-memory chunk store with switchable failures.
#[derive(Default)]
pub struct MemoryChunkStore {
    partial: Mutex<HashMap<String, Vec<u8>>>,
    complete: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_append: AtomicBool,
    pub fail_finalize: AtomicBool,
    pub finalize_count: AtomicUsize,
    /// Milliseconds an append waits after writing before it returns
    pub ack_delay_ms: AtomicU64,
    append_delay: Option<Duration>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_append_delay(delay: Duration) -> Self {
        Self {
            append_delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn partial_len(&self, key: &str) -> Option<usize> {
        self.partial.lock().await.get(key).map(Vec::len)
    }

    pub async fn partial_count(&self) -> usize {
        self.partial.lock().await.len()
    }

    pub async fn artifact(&self, key: &str) -> Option<Vec<u8>> {
        self.complete.lock().await.get(key).cloned()
    }

    fn reference(key: &str) -> String {
        format!("mem://complete/{}", key)
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn allocate(&self) -> Result<String> {
        let key = Uuid::new_v4().to_string();
        self.partial.lock().await.insert(key.clone(), Vec::new());
        Ok(key)
    }

    async fn append(&self, storage_key: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(anyhow!("injected append failure"));
        }
        let committed = {
            let mut partial = self.partial.lock().await;
            let object = partial
                .get_mut(storage_key)
                .ok_or_else(|| anyhow!("no partial object {}", storage_key))?;
            let offset = offset as usize;
            if object.len() < offset {
                return Err(anyhow!(
                    "partial object {} holds {} bytes, behind offset {}",
                    storage_key,
                    object.len(),
                    offset
                ));
            }
            object.truncate(offset);
            object.extend_from_slice(&chunk);
            object.len() as u64
        };
        let ack_delay = self.ack_delay_ms.load(Ordering::SeqCst);
        if ack_delay > 0 {
            tokio::time::sleep(Duration::from_millis(ack_delay)).await;
        }
        Ok(committed)
    }

    async fn finalize(&self, storage_key: &str) -> Result<String> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(anyhow!("injected finalize failure"));
        }
        let mut complete = self.complete.lock().await;
        if complete.contains_key(storage_key) {
            return Ok(Self::reference(storage_key));
        }
        let object = self
            .partial
            .lock()
            .await
            .remove(storage_key)
            .ok_or_else(|| anyhow!("no partial object {}", storage_key))?;
        complete.insert(storage_key.to_string(), object);
        self.finalize_count.fetch_add(1, Ordering::SeqCst);
        Ok(Self::reference(storage_key))
    }

    async fn abort(&self, storage_key: &str) -> Result<()> {
        self.partial.lock().await.remove(storage_key);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub async fn setup_test_db() -> DatabaseConnection {
    // A single connection keeps every query on the same in-memory database
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    run_migrations(&db).await.unwrap();
    db
}

pub fn test_config() -> UploadConfig {
    UploadConfig {
        max_upload_size: 1024 * 1024,
        lock_wait_ms: 2000,
        ..UploadConfig::default()
    }
}

pub struct TestContext {
    pub service: Arc<UploadService>,
    pub store: Arc<MemoryChunkStore>,
    pub completions: mpsc::UnboundedReceiver<UploadCompleted>,
}

pub async fn setup_with(store: MemoryChunkStore, config: UploadConfig) -> TestContext {
    let db = setup_test_db().await;
    let store = Arc::new(store);
    let (hook, completions) = ChannelCompletionHook::channel();
    let service = Arc::new(UploadService::new(
        db,
        store.clone(),
        Arc::new(hook),
        config,
    ));
    TestContext {
        service,
        store,
        completions,
    }
}

pub async fn setup() -> TestContext {
    setup_with(MemoryChunkStore::new(), test_config()).await
}

pub async fn next_completion(
    completions: &mut mpsc::UnboundedReceiver<UploadCompleted>,
) -> UploadCompleted {
    tokio::time::timeout(Duration::from_secs(2), completions.recv())
        .await
        .expect("completion hook was not called")
        .expect("completion channel closed")
}
