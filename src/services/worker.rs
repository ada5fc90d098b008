use crate::services::upload_service::UploadService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Periodically fails expired upload sessions and prunes idle session locks.
pub struct BackgroundWorker {
    uploads: Arc<UploadService>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        uploads: Arc<UploadService>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            uploads,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started (interval {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) {
        tracing::info!("🧹 Running background cleanup tasks...");

        match self.uploads.expire_stale(Utc::now()).await {
            Ok(0) => {}
            Ok(count) => tracing::info!("Expired {} stale upload sessions", count),
            Err(e) => tracing::error!("Failed to expire stale uploads: {}", e),
        }

        let pruned = self.uploads.prune_locks();
        tracing::debug!("Pruned {} idle session locks", pruned);

        tracing::info!("✅ Background cleanup completed");
    }
}
