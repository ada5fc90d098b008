use super::{EXPIRED_DETAIL, StoreOperation, UploadError, UploadInfo, UploadResult, UploadService};
use crate::entities::upload_sessions;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const EXPIRY_BATCH: u64 = 100;

impl UploadService {
    /// Discards the partial object and moves the session to `Aborted`.
    pub async fn abort(&self, session_id: Uuid) -> UploadResult<UploadInfo> {
        let _guard = self.acquire(session_id).await?;
        let session = self.load(session_id).await?;

        if session.status.is_terminal() {
            return Err(UploadError::TerminalState {
                status: session.status,
            });
        }

        self.store
            .abort(&session.storage_key)
            .await
            .map_err(|source| UploadError::Storage {
                operation: StoreOperation::Abort,
                offset: session.received_length.max(0) as u64,
                source,
            })?;

        if !self.registry.mark_aborted(session_id, Utc::now()).await? {
            return Err(UploadError::Internal(format!(
                "Upload {} could not be marked aborted",
                session_id
            )));
        }

        tracing::info!(
            "Upload session {} aborted at {}/{} bytes",
            session_id,
            session.received_length,
            session.declared_length
        );

        self.head(session_id).await
    }

    /// Fails every unfinished session whose deadline passed before `now`.
    /// Sessions busy with a request are skipped without waiting and left for
    /// the next sweep.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> UploadResult<usize> {
        let candidates = self.registry.find_expired(now, EXPIRY_BATCH).await?;
        let mut expired = 0;

        for candidate in candidates {
            let Some(_guard) = self.locks.try_lock(&candidate.id) else {
                tracing::debug!("Session {} is busy, skipping expiry", candidate.id);
                continue;
            };

            let Some(session) = self.registry.get(candidate.id).await? else {
                continue;
            };
            if session.status.is_terminal() || session.expires_at > now {
                continue;
            }

            if self.expire_locked(&session, now).await? {
                expired += 1;
            }
        }

        Ok(expired)
    }

    /// Caller holds the session lock.
    pub(super) async fn expire_locked(
        &self,
        session: &upload_sessions::Model,
        now: DateTime<Utc>,
    ) -> UploadResult<bool> {
        // The storage key stays on the record, so a failed discard can still be cleaned up later
        if let Err(e) = self.store.abort(&session.storage_key).await {
            tracing::error!(
                "Failed to discard partial object {} of expired session {}: {:#}",
                session.storage_key,
                session.id,
                e
            );
        }

        let failed = self
            .registry
            .mark_failed(session.id, EXPIRED_DETAIL, now)
            .await?;
        if failed {
            tracing::info!(
                "⌛ Upload session {} expired at {}/{} bytes",
                session.id,
                session.received_length,
                session.declared_length
            );
        }
        Ok(failed)
    }
}
