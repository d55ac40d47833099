//! # Berth
//!
//! A build distribution server speaking the wharf upload protocol, usable
//! both as a standalone binary and as a library.
//!
//! Developers push versioned builds of a game to named channels; clients
//! fetch the current build of a channel. Build files are uploaded and
//! downloaded through presigned URLs, never through the API itself.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! berth = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use berth::blob::UrlSigner;
//! use berth::config::ServerConfig;
//! use berth::server::{AppState, create_router};
//! use berth::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::load("./data").unwrap();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let key = UrlSigner::read_key(&config.signing_key_path()).unwrap();
//! let state = Arc::new(AppState::with_local_blobs(Arc::new(store), &config, key));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `berth` binary. Disable with `default-features = false`.

pub mod auth;
pub mod blob;
pub mod builds;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
pub mod validation;
