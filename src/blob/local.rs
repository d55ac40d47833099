use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use uuid::Uuid;

use super::{BlobError, BlobOp, BlobReader, BlobStore, ObjectStat, UrlSigner, validate_path};

/// Filesystem blob store whose presigned URLs point back at this server's
/// `/blobs` routes.
pub struct LocalBlobStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_path(path)?;
        Ok(self.base_path.join(path))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join(".tmp").join(Uuid::new_v4().to_string())
    }

    async fn write_temp(&self, temp_path: &Path, mut body: BlobReader) -> Result<u64, BlobError> {
        let file = File::create(temp_path).await?;
        let mut writer = BufWriter::new(file);

        let written = tokio::io::copy(&mut body, &mut writer).await?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        Ok(written)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn presign_upload(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_path(path)?;
        Ok(self.signer.signed_url(BlobOp::Put, path, ttl))
    }

    async fn presign_download(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_path(path)?;
        Ok(self.signer.signed_url(BlobOp::Get, path, ttl))
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, BlobError> {
        let object_path = self.object_path(path)?;

        match fs::metadata(&object_path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectStat {
                size: metadata.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn get(&self, path: &str) -> Result<BlobReader, BlobError> {
        let object_path = self.object_path(path)?;
        let file = File::open(&object_path).await.map_err(BlobError::from_io)?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn put(&self, path: &str, body: BlobReader) -> Result<u64, BlobError> {
        let final_path = self.object_path(path)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let written = match self.write_temp(&temp_path, body).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Linking fails if the target exists, so a finalized object can never
        // be swapped for different bytes.
        let linked = fs::hard_link(&temp_path, &final_path).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => Ok(written),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(BlobError::AlreadyExists),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}
