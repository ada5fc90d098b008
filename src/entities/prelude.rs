pub use super::upload_sessions::Entity as UploadSessions;
pub use super::upload_sessions::UploadStatus;
