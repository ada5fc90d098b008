use crate::config::UploadConfig;
use crate::services::chunk_store::{ChunkStore, LocalChunkStore, S3ChunkStore};
use anyhow::Context;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

pub async fn setup_chunk_store(config: &UploadConfig) -> anyhow::Result<Arc<dyn ChunkStore>> {
    match config.storage_backend.as_str() {
        "s3" => Ok(Arc::new(setup_s3().await?)),
        "local" => {
            info!(
                "💾 Local chunk store: {}",
                config.local_storage_path.display()
            );
            let store = LocalChunkStore::new(config.local_storage_path.clone()).await?;
            Ok(Arc::new(store))
        }
        other => Err(anyhow::anyhow!("Unknown STORAGE_BACKEND: {}", other)),
    }
}

async fn setup_s3() -> anyhow::Result<S3ChunkStore> {
    let endpoint_url = env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?;
    let access_key = env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?;
    let secret_key = env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?;
    let bucket = env::var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?;

    info!("☁️  S3 chunk store: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Ok(S3ChunkStore::new(s3_client, bucket))
}
