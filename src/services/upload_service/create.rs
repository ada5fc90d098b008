use super::{CreateUpload, CreatedUpload, StoreOperation, UploadError, UploadResult, UploadService};
use crate::services::session_registry::NewSession;
use chrono::Utc;
use uuid::Uuid;

impl UploadService {
    /// Opens a new session in `Pending` with nothing received.
    ///
    /// The declared length is validated before the chunk store is touched, so
    /// a rejected request leaves no state behind.
    pub async fn create(&self, req: CreateUpload) -> UploadResult<CreatedUpload> {
        let declared_length = req
            .declared_length
            .ok_or_else(|| UploadError::Validation("Upload-Length is required".to_string()))?;

        if declared_length == 0 {
            return Err(UploadError::Validation(
                "Upload-Length must be a positive integer".to_string(),
            ));
        }
        if declared_length > self.config.max_upload_size {
            return Err(UploadError::Validation(format!(
                "File too large. Max: {} bytes",
                self.config.max_upload_size
            )));
        }
        let declared = i64::try_from(declared_length).map_err(|_| {
            UploadError::Validation("Upload-Length is out of range".to_string())
        })?;

        let metadata = serde_json::to_value(&req.metadata)
            .map_err(|e| UploadError::Internal(format!("Failed to encode metadata: {}", e)))?;

        let storage_key = self
            .store
            .allocate()
            .await
            .map_err(|source| UploadError::Storage {
                operation: StoreOperation::Allocate,
                offset: 0,
                source,
            })?;

        let now = Utc::now();
        let session = self
            .registry
            .insert(NewSession {
                id: Uuid::new_v4(),
                declared_length: declared,
                storage_key: storage_key.clone(),
                metadata,
                created_at: now,
                expires_at: now + self.config.upload_ttl(),
            })
            .await;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                // Don't leak an orphaned object when the record could not be written
                if let Err(abort_err) = self.store.abort(&storage_key).await {
                    tracing::warn!("Failed to release storage {}: {:#}", storage_key, abort_err);
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            "Created upload session {} ({} bytes declared)",
            session.id,
            declared_length
        );

        Ok(CreatedUpload {
            session_id: session.id,
            location: self.location(session.id),
            info: session.into(),
        })
    }
}
