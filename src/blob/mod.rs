//! Blob store gateway.
//!
//! Build files never pass through the API handlers: clients receive a
//! time-bounded presigned URL and talk to the blob store directly. The
//! engine only stats objects to verify uploads and streams them back out
//! when assembling archives.

mod local;
mod signing;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

pub use local::LocalBlobStore;
pub use signing::{BlobOp, UrlSigner};

pub type BlobReader = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found")]
    NotFound,
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("invalid or expired signature")]
    Signature,
    #[error("object already exists")]
    AlreadyExists,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns a URL that accepts a single `PUT` of the object body until `ttl` elapses.
    async fn presign_upload(&self, path: &str, ttl: Duration) -> Result<String, BlobError>;

    /// Returns a URL that serves the object with `GET` until `ttl` elapses.
    async fn presign_download(&self, path: &str, ttl: Duration) -> Result<String, BlobError>;

    /// `Ok(None)` when nothing has been written at `path`.
    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, BlobError>;

    async fn get(&self, path: &str) -> Result<BlobReader, BlobError>;

    /// Writes the whole stream at `path`. The object becomes visible only once
    /// complete. Returns the number of bytes stored.
    async fn put(&self, path: &str, body: BlobReader) -> Result<u64, BlobError>;
}

/// Rejects paths that could escape the store root.
pub fn validate_path(path: &str) -> Result<(), BlobError> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(BlobError::InvalidPath(path.to_string()));
    }

    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.starts_with(".tmp") {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
    }

    Ok(())
}
