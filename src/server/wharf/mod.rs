mod extract;
mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub use extract::WharfBody;
pub(crate) use handlers::parse_id;

/// Routes spoken by the upload client, mounted under `/wharf`.
pub fn wharf_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/channels", get(handlers::list_channels))
        .route("/channels/{channel}", get(handlers::get_channel))
        .route("/builds", post(handlers::create_build))
        .route(
            "/builds/{id}/files",
            get(handlers::list_build_files).post(handlers::create_build_file),
        )
        .route(
            "/builds/{id}/files/{file_id}",
            post(handlers::finalize_build_file),
        )
        .route(
            "/builds/{id}/files/{file_id}/download",
            get(handlers::download_build_file),
        )
}
