use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// File name of the optional config file inside the data directory.
pub const CONFIG_FILE: &str = "berth.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://builds.example.com").
    /// Presigned blob URLs are built from it. Defaults to `http://host:port`.
    pub public_base_url: Option<String>,
    /// Validity window of presigned upload and download URLs.
    pub presign_ttl_secs: u64,
    /// Upper bound for a single blob store call made while serving a request.
    pub blob_timeout_secs: u64,
}

impl ServerConfig {
    /// Loads `<data_dir>/berth.toml` if it exists, otherwise returns defaults
    /// rooted at `data_dir`.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str::<ServerConfig>(&raw)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            ServerConfig::default()
        };

        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("berth.db")
    }

    #[must_use]
    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    #[must_use]
    pub fn signing_key_path(&self) -> PathBuf {
        self.data_dir.join(".signing_key")
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    #[must_use]
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    #[must_use]
    pub fn blob_timeout(&self) -> Duration {
        Duration::from_secs(self.blob_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            presign_ttl_secs: 3600,
            blob_timeout_secs: 30,
        }
    }
}
