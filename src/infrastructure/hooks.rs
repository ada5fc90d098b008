use crate::config::UploadConfig;
use crate::services::completion::{CompletionHook, LoggingCompletionHook, WebhookCompletionHook};
use std::sync::Arc;
use tracing::info;

pub fn setup_completion_hook(config: &UploadConfig) -> anyhow::Result<Arc<dyn CompletionHook>> {
    match &config.completion_webhook_url {
        Some(url) => {
            info!("🔔 Completion webhook: {}", url);
            Ok(Arc::new(WebhookCompletionHook::new(url.clone())?))
        }
        None => {
            info!("🔔 No completion webhook configured, completions are logged only");
            Ok(Arc::new(LoggingCompletionHook))
        }
    }
}
