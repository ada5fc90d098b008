use super::ChunkStore;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

const PARTIAL_DIR: &str = "partial";
const COMPLETE_DIR: &str = "complete";

/// Chunk store on the local filesystem.
///
/// In-flight objects live in `<root>/partial/<key>` and are moved to
/// `<root>/complete/<key>` when finalized. Keys are UUIDs, so a key can never
/// address a path outside the store root.
pub struct LocalChunkStore {
    root: PathBuf,
}

impl LocalChunkStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [PARTIAL_DIR, COMPLETE_DIR] {
            fs::create_dir_all(root.join(dir))
                .await
                .with_context(|| format!("Failed to create {}", root.join(dir).display()))?;
        }
        let root = fs::canonicalize(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parse_key(storage_key: &str) -> Result<Uuid> {
        Uuid::parse_str(storage_key).map_err(|_| anyhow!("Invalid storage key: {}", storage_key))
    }

    fn partial_path(&self, id: Uuid) -> PathBuf {
        self.root.join(PARTIAL_DIR).join(id.to_string())
    }

    fn complete_path(&self, id: Uuid) -> PathBuf {
        self.root.join(COMPLETE_DIR).join(id.to_string())
    }

    fn reference(path: &Path) -> String {
        format!("file://{}", path.display())
    }
}

#[async_trait]
impl ChunkStore for LocalChunkStore {
    async fn allocate(&self) -> Result<String> {
        let id = Uuid::new_v4();
        fs::File::create(self.partial_path(id))
            .await
            .with_context(|| format!("Failed to allocate partial object {}", id))?;
        Ok(id.to_string())
    }

    async fn append(&self, storage_key: &str, offset: u64, chunk: Bytes) -> Result<u64> {
        let path = self.partial_path(Self::parse_key(storage_key)?);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .with_context(|| format!("Partial object not found: {}", storage_key))?;

        let current = file.metadata().await?.len();
        if current < offset {
            return Err(anyhow!(
                "Partial object {} holds {} bytes, behind committed offset {}",
                storage_key,
                current,
                offset
            ));
        }
        if current > offset {
            tracing::info!(
                "Discarding {} unacknowledged bytes past offset {} in {}",
                current - offset,
                offset,
                storage_key
            );
            file.set_len(offset).await?;
        }

        let written = async {
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(&chunk).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(
                "Append to {} failed after partial write, truncating to {} bytes",
                storage_key,
                offset
            );
            if let Err(truncate_err) = file.set_len(offset).await {
                tracing::error!(
                    "Failed to truncate {} back to {} bytes: {}",
                    storage_key,
                    offset,
                    truncate_err
                );
            }
            return Err(anyhow!(e).context(format!("Append to {} failed", storage_key)));
        }

        Ok(offset + chunk.len() as u64)
    }

    async fn finalize(&self, storage_key: &str) -> Result<String> {
        let id = Self::parse_key(storage_key)?;
        let partial = self.partial_path(id);
        let complete = self.complete_path(id);

        match fs::rename(&partial, &complete).await {
            Ok(()) => Ok(Self::reference(&complete)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if fs::try_exists(&complete).await.unwrap_or(false) {
                    tracing::debug!("{} already finalized", storage_key);
                    Ok(Self::reference(&complete))
                } else {
                    Err(anyhow!("Partial object not found: {}", storage_key))
                }
            }
            Err(e) => Err(anyhow!(e).context(format!("Failed to finalize {}", storage_key))),
        }
    }

    async fn abort(&self, storage_key: &str) -> Result<()> {
        let path = self.partial_path(Self::parse_key(storage_key)?);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!(e).context(format!("Failed to discard {}", storage_key))),
        }
    }

    async fn health_check(&self) -> bool {
        fs::metadata(self.root.join(PARTIAL_DIR)).await.is_ok()
    }
}
