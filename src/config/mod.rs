use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the resumable upload service
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Largest `Upload-Length` a client may declare, in bytes (default: 100 MB)
    pub max_upload_size: u64,

    /// Largest single PATCH body accepted, in bytes (default: 32 MB)
    pub max_chunk_size: usize,

    /// Hours an unfinished upload stays resumable (default: 24)
    pub upload_expiration_hours: i64,

    /// Seconds between background sweeps of expired sessions (default: 3600)
    pub cleanup_interval_secs: u64,

    /// How long a PATCH/DELETE waits for a busy session before giving up
    pub lock_wait_ms: u64,

    /// Chunk store backend: "local" or "s3" (default: "local")
    pub storage_backend: String,

    /// Root directory of the local chunk store
    pub local_storage_path: PathBuf,

    /// Path prefix the TUS endpoints are mounted under
    pub upload_base_path: String,

    /// Optional endpoint notified when an upload completes
    pub completion_webhook_url: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024, // 100 MB
            max_chunk_size: 32 * 1024 * 1024,   // 32 MB
            upload_expiration_hours: 24,
            cleanup_interval_secs: 3600,
            lock_wait_ms: 5000,
            storage_backend: "local".to_string(),
            local_storage_path: PathBuf::from("./data/uploads"),
            upload_base_path: "/api/v1/files/upload".to_string(),
            completion_webhook_url: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_upload_size: env::var("TUS_MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),
            max_chunk_size: env::var("TUS_MAX_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_chunk_size),
            upload_expiration_hours: env::var("TUS_UPLOAD_EXPIRATION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(default.upload_expiration_hours),
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(default.cleanup_interval_secs),
            lock_wait_ms: env::var("SESSION_LOCK_WAIT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.lock_wait_ms),
            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.storage_backend),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.local_storage_path),
            upload_base_path: env::var("UPLOAD_BASE_PATH")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.upload_base_path),
            completion_webhook_url: env::var("COMPLETION_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (local storage, short expiry, no webhook)
    pub fn development() -> Self {
        Self {
            upload_expiration_hours: 1,
            cleanup_interval_secs: 60,
            local_storage_path: PathBuf::from("./data/dev-uploads"),
            ..Self::default()
        }
    }

    /// Create config for production (S3 storage unless overridden)
    pub fn production() -> Self {
        let mut config = Self::from_env();
        if env::var("STORAGE_BACKEND").is_err() {
            config.storage_backend = "s3".to_string();
        }
        config
    }

    pub fn upload_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.upload_expiration_hours)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
