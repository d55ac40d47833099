//! Routes behind the presigned URLs issued by [`LocalBlobStore`].
//!
//! No API key is involved: the signature in the query string is the
//! capability.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::info;

use crate::blob::{BlobOp, BlobStore, LocalBlobStore};
use crate::server::AppState;
use crate::server::response::ApiError;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub op: BlobOp,
    pub expires: u64,
    pub sig: String,
}

pub fn blob_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{*path}", get(download).put(upload))
        .layer(DefaultBodyLimit::disable())
}

fn authorize(
    state: &AppState,
    path: &str,
    expected: BlobOp,
    params: &SignedParams,
) -> Result<Arc<LocalBlobStore>, ApiError> {
    let blobs = state
        .local_blobs
        .clone()
        .ok_or_else(|| ApiError::not_found("blob routes are not served here"))?;

    if params.op != expected {
        return Err(ApiError::forbidden("signature does not permit this operation"));
    }

    blobs
        .signer()
        .verify(params.op, path, params.expires, &params.sig)?;

    Ok(blobs)
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<SignedParams>,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let blobs = authorize(&state, &path, BlobOp::Put, &params)?;

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);

    let size = blobs.put(&path, Box::new(reader)).await?;
    info!(size, "Stored blob {path}");

    Ok(StatusCode::OK)
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ApiError> {
    let blobs = authorize(&state, &path, BlobOp::Get, &params)?;

    let stat = blobs
        .stat(&path)
        .await?
        .ok_or_else(|| ApiError::not_found("object not found"))?;
    let reader = blobs.get(&path).await?;

    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, stat.size)
        .body(body)
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}
