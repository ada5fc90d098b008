use crate::config::UploadConfig;
use crate::entities::upload_sessions;
use crate::services::chunk_store::ChunkStore;
use crate::services::completion::{CompletionHook, UploadCompleted};
use crate::services::session_registry::SessionRegistry;
use crate::utils::keyed_mutex::{KeyedGuard, KeyedMutex};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

pub mod abort;
pub mod create;
pub mod error;
pub mod patch;
pub mod types;

pub use error::{StoreOperation, UploadError, UploadResult};
pub use types::{CreateUpload, CreatedUpload, PatchOutcome, UploadInfo};

pub const EXPIRED_DETAIL: &str = "upload expired before completion";

/// The upload protocol engine: create, head, patch and abort on top of the
/// session registry, the per-session locks and the chunk store.
pub struct UploadService {
    registry: SessionRegistry,
    store: Arc<dyn ChunkStore>,
    hook: Arc<dyn CompletionHook>,
    locks: KeyedMutex<Uuid>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        db: DatabaseConnection,
        store: Arc<dyn ChunkStore>,
        hook: Arc<dyn CompletionHook>,
        config: UploadConfig,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(db),
            store,
            hook,
            locks: KeyedMutex::new(),
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn location(&self, session_id: Uuid) -> String {
        format!("{}/{}", self.config.upload_base_path, session_id)
    }

    /// Current committed state of a session. Never takes the session lock.
    pub async fn head(&self, session_id: Uuid) -> UploadResult<UploadInfo> {
        self.registry
            .get(session_id)
            .await?
            .map(UploadInfo::from)
            .ok_or(UploadError::NotFound(session_id))
    }

    /// Drops lock entries for sessions nobody is working on.
    pub fn prune_locks(&self) -> usize {
        self.locks.cleanup()
    }

    async fn acquire(&self, session_id: Uuid) -> UploadResult<KeyedGuard> {
        self.locks
            .lock_timeout(&session_id, self.config.lock_wait())
            .await
            .ok_or_else(|| {
                tracing::warn!("Timed out waiting for lock on session {}", session_id);
                UploadError::Locked(session_id)
            })
    }

    async fn load(&self, session_id: Uuid) -> UploadResult<upload_sessions::Model> {
        self.registry
            .get(session_id)
            .await?
            .ok_or(UploadError::NotFound(session_id))
    }

    fn notify_completed(&self, event: UploadCompleted) {
        let hook = self.hook.clone();
        tokio::spawn(async move {
            if let Err(e) = hook.upload_completed(&event).await {
                tracing::warn!(
                    "Completion hook failed for session {}: {:#}",
                    event.session_id,
                    e
                );
            }
        });
    }
}
