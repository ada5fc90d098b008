use super::{PatchOutcome, StoreOperation, UploadError, UploadResult, UploadService};
use crate::entities::upload_sessions::{self, UploadStatus};
use crate::services::completion::UploadCompleted;
use crate::utils::checksum::ChunkChecksum;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

const DIVERGED_DETAIL: &str = "chunk store length diverged from committed offset";

fn outcome(
    session: &upload_sessions::Model,
    artifact_reference: Option<String>,
) -> PatchOutcome {
    PatchOutcome {
        session_id: session.id,
        received_length: session.received_length.max(0) as u64,
        declared_length: session.declared_length.max(0) as u64,
        status: session.status,
        artifact_reference,
    }
}

impl UploadService {
    /// Appends `chunk` at `claimed_offset`.
    ///
    /// Runs entirely under the session lock. The committed offset only moves
    /// after the chunk store has accepted the bytes, and the chunk is only
    /// accepted when `claimed_offset` equals that committed offset.
    pub async fn patch(
        &self,
        session_id: Uuid,
        claimed_offset: u64,
        chunk: Bytes,
        checksum: Option<&ChunkChecksum>,
    ) -> UploadResult<PatchOutcome> {
        if let Some(checksum) = checksum
            && !checksum.matches(&chunk)
        {
            tracing::warn!("Checksum mismatch on chunk for session {}", session_id);
            return Err(UploadError::ChecksumMismatch);
        }

        let _guard = self.acquire(session_id).await?;
        let session = self.load(session_id).await?;

        if session.status.is_terminal() {
            return Err(UploadError::TerminalState {
                status: session.status,
            });
        }

        let now = Utc::now();
        if session.expires_at <= now {
            self.expire_locked(&session, now).await?;
            return Err(UploadError::TerminalState {
                status: UploadStatus::Failed,
            });
        }

        let received = session.received_length.max(0) as u64;
        let declared = session.declared_length.max(0) as u64;

        if claimed_offset != received {
            tracing::info!(
                "Offset conflict on session {}: client sent {}, committed {}",
                session_id,
                claimed_offset,
                received
            );
            return Err(UploadError::Conflict {
                claimed: claimed_offset,
                current: received,
            });
        }

        let chunk_len = chunk.len() as u64;
        let new_received = match received.checked_add(chunk_len) {
            Some(total) if total <= declared => total,
            _ => {
                tracing::warn!(
                    "Oversize chunk on session {}: {} bytes at offset {} (declared {})",
                    session_id,
                    chunk_len,
                    received,
                    declared
                );
                return Err(UploadError::Oversize {
                    offset: received,
                    chunk_len,
                    declared,
                });
            }
        };

        if chunk_len == 0 {
            // An empty PATCH on a fully received session retries finalization
            if received == declared {
                return self.finalize_locked(session).await;
            }
            return Ok(outcome(&session, None));
        }

        let appended = self
            .store
            .append(&session.storage_key, received, chunk)
            .await;
        let committed = match appended {
            Ok(committed) => committed,
            Err(source) => {
                tracing::warn!(
                    "Append failed for session {} at offset {}: {:#}",
                    session_id,
                    received,
                    source
                );
                if session.status == UploadStatus::Pending
                    && let Err(e) = self.registry.mark_uploading(session_id, Utc::now()).await
                {
                    tracing::warn!("Failed to mark session {} uploading: {}", session_id, e);
                }
                return Err(UploadError::Storage {
                    operation: StoreOperation::Append,
                    offset: received,
                    source,
                });
            }
        };

        if committed != new_received {
            tracing::error!(
                "Chunk store holds {} bytes for session {} but {} were expected, failing session",
                committed,
                session_id,
                new_received
            );
            if let Err(e) = self.store.abort(&session.storage_key).await {
                tracing::error!("Failed to discard {}: {:#}", session.storage_key, e);
            }
            self.registry
                .mark_failed(session_id, DIVERGED_DETAIL, Utc::now())
                .await?;
            return Err(UploadError::Internal(format!(
                "Upload {} failed: {}",
                session_id, DIVERGED_DETAIL
            )));
        }

        let now = Utc::now();
        if !self
            .registry
            .advance(&session, new_received as i64, now)
            .await?
        {
            tracing::error!(
                "Registry refused offset {} -> {} for session {}",
                received,
                new_received,
                session_id
            );
            return Err(UploadError::Internal(format!(
                "Upload {} changed while locked",
                session_id
            )));
        }

        tracing::debug!(
            "Session {} committed {} bytes at offset {} ({}/{})",
            session_id,
            chunk_len,
            received,
            new_received,
            declared
        );

        let session = upload_sessions::Model {
            received_length: new_received as i64,
            status: UploadStatus::Uploading,
            started_at: Some(session.started_at.unwrap_or(now)),
            updated_at: now,
            ..session
        };

        if new_received == declared {
            return self.finalize_locked(session).await;
        }

        Ok(outcome(&session, None))
    }

    /// Seals a fully received session. Caller holds the session lock.
    async fn finalize_locked(&self, session: upload_sessions::Model) -> UploadResult<PatchOutcome> {
        let received = session.received_length.max(0) as u64;

        let artifact_reference = self
            .store
            .finalize(&session.storage_key)
            .await
            .map_err(|source| {
                tracing::warn!(
                    "Finalize failed for session {}, it stays uploading: {:#}",
                    session.id,
                    source
                );
                UploadError::Storage {
                    operation: StoreOperation::Finalize,
                    offset: received,
                    source,
                }
            })?;

        let now = Utc::now();
        if !self
            .registry
            .mark_completed(&session, &artifact_reference, now)
            .await?
        {
            return Err(UploadError::Internal(format!(
                "Upload {} could not be marked completed",
                session.id
            )));
        }

        tracing::info!(
            "✅ Upload session {} completed ({} bytes) -> {}",
            session.id,
            received,
            artifact_reference
        );

        self.notify_completed(UploadCompleted {
            session_id: session.id,
            artifact_reference: artifact_reference.clone(),
            length: received,
            metadata: serde_json::from_value(session.metadata.clone()).unwrap_or_default(),
        });

        let session = upload_sessions::Model {
            status: UploadStatus::Completed,
            ..session
        };
        Ok(outcome(&session, Some(artifact_reference)))
    }
}
