use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::{blob_router, profile_router, wharf_router};
use crate::blob::{LocalBlobStore, UrlSigner};
use crate::builds::BuildEngine;
use crate::config::ServerConfig;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: BuildEngine,
    /// Set when blobs live on this server's disk; enables the signed
    /// `/blobs` routes that presigned URLs point at.
    pub local_blobs: Option<Arc<LocalBlobStore>>,
}

impl AppState {
    /// Wires the engine to a blob store on local disk under `config.blob_dir()`.
    pub fn with_local_blobs(
        store: Arc<dyn Store>,
        config: &ServerConfig,
        signing_key: Vec<u8>,
    ) -> Self {
        let signer = UrlSigner::new(signing_key, config.base_url());
        let blobs = Arc::new(LocalBlobStore::new(config.blob_dir(), signer));
        let engine = BuildEngine::new(
            Arc::clone(&store),
            blobs.clone(),
            config.presign_ttl(),
            config.blob_timeout(),
        );

        Self {
            store,
            engine,
            local_blobs: Some(blobs),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    // Path only: query strings may carry api keys or blob signatures.
    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/wharf", wharf_router())
        .nest("/blobs", blob_router())
        .merge(profile_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
