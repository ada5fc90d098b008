use crate::utils::metadata::UploadMetadata;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Emitted once an upload has been finalized into a durable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadCompleted {
    pub session_id: Uuid,
    pub artifact_reference: String,
    pub length: u64,
    pub metadata: UploadMetadata,
}

/// Consumer of completed uploads (e.g. attaching the artifact to a case record).
///
/// Delivery is at-least-once, so implementations must be idempotent on
/// `session_id`.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn upload_completed(&self, event: &UploadCompleted) -> Result<()>;
}

pub struct LoggingCompletionHook;

#[async_trait]
impl CompletionHook for LoggingCompletionHook {
    async fn upload_completed(&self, event: &UploadCompleted) -> Result<()> {
        tracing::info!(
            session_id = %event.session_id,
            artifact = %event.artifact_reference,
            length = event.length,
            "upload_completed"
        );
        Ok(())
    }
}

/// Forwards completions to an in-process receiver.
pub struct ChannelCompletionHook {
    tx: mpsc::UnboundedSender<UploadCompleted>,
}

impl ChannelCompletionHook {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadCompleted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CompletionHook for ChannelCompletionHook {
    async fn upload_completed(&self, event: &UploadCompleted) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("Completion receiver dropped"))
    }
}

/// POSTs each completion as JSON to an external bookkeeping endpoint.
pub struct WebhookCompletionHook {
    client: reqwest::Client,
    url: String,
}

impl WebhookCompletionHook {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CompletionHook for WebhookCompletionHook {
    async fn upload_completed(&self, event: &UploadCompleted) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
