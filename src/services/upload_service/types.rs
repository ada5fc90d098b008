use crate::entities::upload_sessions::{self, UploadStatus};
use crate::utils::metadata::UploadMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Input to `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateUpload {
    pub declared_length: Option<u64>,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CreatedUpload {
    pub session_id: Uuid,
    /// Where the client sends subsequent HEAD/PATCH/DELETE requests
    pub location: String,
    pub info: UploadInfo,
}

/// Snapshot of a session as last committed.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UploadInfo {
    pub session_id: Uuid,
    pub declared_length: u64,
    pub received_length: u64,
    pub status: UploadStatus,
    pub progress_percent: f64,
    pub metadata: UploadMetadata,
    pub artifact_reference: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub aborted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl UploadInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at <= now
    }
}

fn progress_percent(received: u64, declared: u64) -> f64 {
    if declared == 0 {
        return 0.0;
    }
    let percent = (received as f64 / declared as f64) * 100.0;
    (percent.min(100.0) * 100.0).round() / 100.0
}

impl From<upload_sessions::Model> for UploadInfo {
    fn from(model: upload_sessions::Model) -> Self {
        let declared_length = model.declared_length.max(0) as u64;
        let received_length = model.received_length.max(0) as u64;
        Self {
            session_id: model.id,
            declared_length,
            received_length,
            status: model.status,
            progress_percent: progress_percent(received_length, declared_length),
            metadata: serde_json::from_value(model.metadata).unwrap_or_default(),
            artifact_reference: model.artifact_reference,
            error_detail: model.error_detail,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
            failed_at: model.failed_at,
            aborted_at: model.aborted_at,
            expires_at: model.expires_at,
        }
    }
}

/// Result of a successful `patch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PatchOutcome {
    pub session_id: Uuid,
    pub received_length: u64,
    pub declared_length: u64,
    pub status: UploadStatus,
    /// Set only by the call that finalized the upload
    pub artifact_reference: Option<String>,
}

impl PatchOutcome {
    pub fn completed(&self) -> bool {
        self.status == UploadStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_rounded_and_capped() {
        assert_eq!(progress_percent(0, 300), 0.0);
        assert_eq!(progress_percent(100, 300), 33.33);
        assert_eq!(progress_percent(300, 300), 100.0);
        assert_eq!(progress_percent(10, 0), 0.0);
    }

    #[test]
    fn terminal_sessions_never_expire() {
        let now = Utc::now();
        let mut info = UploadInfo {
            session_id: Uuid::new_v4(),
            declared_length: 10,
            received_length: 4,
            status: UploadStatus::Uploading,
            progress_percent: 40.0,
            metadata: UploadMetadata::new(),
            artifact_reference: None,
            error_detail: None,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
            failed_at: None,
            aborted_at: None,
            expires_at: now,
        };
        assert!(info.is_expired(now));
        assert!(!info.is_expired(now - chrono::Duration::seconds(1)));

        info.status = UploadStatus::Aborted;
        assert!(!info.is_expired(now));
    }
}
