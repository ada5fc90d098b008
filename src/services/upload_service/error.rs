use crate::entities::upload_sessions::UploadStatus;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Chunk store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Allocate,
    Append,
    Finalize,
    Abort,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreOperation::Allocate => "allocate",
            StoreOperation::Append => "append",
            StoreOperation::Finalize => "finalize",
            StoreOperation::Abort => "abort",
        })
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid upload request: {0}")]
    Validation(String),

    #[error("Upload session {0} not found")]
    NotFound(Uuid),

    #[error("Offset conflict: client sent {claimed}, committed offset is {current}")]
    Conflict { claimed: u64, current: u64 },

    #[error("Chunk of {chunk_len} bytes at offset {offset} exceeds declared length {declared}")]
    Oversize {
        offset: u64,
        chunk_len: u64,
        declared: u64,
    },

    #[error("Upload session is {status} and accepts no further changes")]
    TerminalState { status: UploadStatus },

    #[error("Upload session {0} is busy, retry later")]
    Locked(Uuid),

    #[error("Chunk checksum does not match its content")]
    ChecksumMismatch,

    /// The committed offset is unchanged and the client retries from `offset`.
    ///
    /// When an append fails on a `Pending` session, the move to `Uploading` is
    /// best-effort: a registry error there is logged and this error is still
    /// returned. Both states resume the same way.
    #[error("Chunk store {operation} failed at offset {offset}: {source:#}")]
    Storage {
        operation: StoreOperation,
        offset: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Session registry error: {0}")]
    Registry(#[from] sea_orm::DbErr),

    #[error("{0}")]
    Internal(String),
}

impl UploadError {
    /// Committed offset the client should resume from, when known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            UploadError::Conflict { current, .. } => Some(*current),
            UploadError::Oversize { offset, .. } => Some(*offset),
            UploadError::Storage { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Whether the identical request may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Storage { .. } | UploadError::Locked(_))
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
