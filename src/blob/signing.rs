use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Deserialize;
use sha2::Sha256;

use super::BlobError;

type HmacSha256 = Hmac<Sha256>;

const KEY_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobOp {
    Put,
    Get,
}

impl BlobOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BlobOp::Put => "put",
            BlobOp::Get => "get",
        }
    }
}

impl fmt::Display for BlobOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues and checks capability URLs of the form
/// `{base}/blobs/{path}?op=..&expires=..&sig=..`.
///
/// `sig` is HMAC-SHA256 over `op \n path \n expires`, hex encoded.
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    #[must_use]
    pub fn new(key: Vec<u8>, base_url: impl Into<String>) -> Self {
        Self {
            key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Reads a hex encoded key written by [`UrlSigner::write_key`].
    pub fn read_key(path: &Path) -> std::io::Result<Vec<u8>> {
        let raw = std::fs::read_to_string(path)?;
        hex::decode(raw.trim())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn write_key(path: &Path, key: &[u8]) -> std::io::Result<()> {
        std::fs::write(path, hex::encode(key))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn mac(&self, op: BlobOp, path: &str, expires: u64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(op.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    #[must_use]
    pub fn sign(&self, op: BlobOp, path: &str, expires: u64) -> String {
        hex::encode(self.mac(op, path, expires).finalize().into_bytes())
    }

    #[must_use]
    pub fn signed_url(&self, op: BlobOp, path: &str, ttl: Duration) -> String {
        let expires = unix_now() + ttl.as_secs();
        let encoded = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/blobs/{encoded}?op={op}&expires={expires}&sig={}",
            self.base_url,
            self.sign(op, path, expires)
        )
    }

    /// Checks the signature in constant time, then the expiry.
    pub fn verify(&self, op: BlobOp, path: &str, expires: u64, sig: &str) -> Result<(), BlobError> {
        let sig = hex::decode(sig).map_err(|_| BlobError::Signature)?;

        self.mac(op, path, expires)
            .verify_slice(&sig)
            .map_err(|_| BlobError::Signature)?;

        if expires < unix_now() {
            return Err(BlobError::Signature);
        }

        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
