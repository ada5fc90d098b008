use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

mod local;
mod s3;

pub use local::LocalChunkStore;
pub use s3::S3ChunkStore;

/// Append-only byte sink behind an upload session.
///
/// Keys are opaque to callers: they come from [`ChunkStore::allocate`] and are
/// passed back unchanged. Every failure is reported; an implementation must
/// never claim bytes it did not durably write.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Reserve a fresh, empty object and return its storage key.
    async fn allocate(&self) -> Result<String>;

    /// Write `chunk` at `offset` and return the object's committed length.
    ///
    /// `offset` is the length the registry has committed. Bytes the object
    /// holds past it were never acknowledged (an abandoned request) and are
    /// replaced. An object shorter than `offset` is an error.
    async fn append(&self, storage_key: &str, offset: u64, chunk: Bytes) -> Result<u64>;

    /// Seal the object and return a durable artifact reference.
    ///
    /// Calling this again after it succeeded returns the same reference
    /// without producing a second artifact.
    async fn finalize(&self, storage_key: &str) -> Result<String>;

    /// Discard a partial object.
    async fn abort(&self, storage_key: &str) -> Result<()>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;
}
