use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use tracing::debug;

use super::WharfBody;
use crate::auth::RequireUser;
use crate::builds::Target;
use crate::server::AppState;
use crate::server::dto::{
    BuildFileEntry, BuildFilesResponse, ChannelInfo, ChannelResponse, ChannelsResponse,
    CreateBuildFileRequest, CreateBuildFileResponse, CreateBuildRequest, CreateBuildResponse,
    FinalizeBuildFileRequest, FinalizeBuildFileResponse, FinalizedFile, StatusResponse,
    TargetParams,
};
use crate::server::response::ApiError;

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid {what} id")))
}

fn parse_target(raw: &str) -> Result<Target, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::bad_request("missing target"));
    }
    Ok(raw.parse()?)
}

pub async fn status(_auth: RequireUser) -> impl IntoResponse {
    Json(StatusResponse { ok: true })
}

pub async fn list_channels(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<TargetParams>,
) -> Result<impl IntoResponse, ApiError> {
    let target = parse_target(&params.target)?;

    let channels = state
        .engine
        .list_channels(&user, &target.namespace, &target.game)?
        .into_iter()
        .map(|head| (head.channel.name.clone(), ChannelInfo::from(head)))
        .collect();

    Ok(Json(ChannelsResponse { channels }))
}

pub async fn get_channel(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(params): Query<TargetParams>,
) -> Result<impl IntoResponse, ApiError> {
    let target = parse_target(&params.target)?;

    let head = state
        .engine
        .get_channel(&user, &target.namespace, &target.game, &channel)?;

    Ok(Json(ChannelResponse {
        channel: head.into(),
    }))
}

pub async fn create_build(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    WharfBody(req): WharfBody<CreateBuildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.target.is_empty() {
        return Err(ApiError::bad_request("missing target"));
    }
    if req.channel.is_empty() {
        return Err(ApiError::bad_request("missing channel"));
    }

    let build = state
        .engine
        .create_build(&user, &req.target, &req.channel, &req.user_version)
        .await?;

    Ok(Json(CreateBuildResponse {
        build: build.into(),
    }))
}

pub async fn list_build_files(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let build_id = parse_id(&id, "build")?;

    let files = state
        .engine
        .list_build_files(&user, build_id)?
        .into_iter()
        .map(BuildFileEntry::from)
        .collect();

    Ok(Json(BuildFilesResponse { files }))
}

pub async fn create_build_file(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    WharfBody(req): WharfBody<CreateBuildFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let build_id = parse_id(&id, "build")?;
    if req.kind.is_empty() {
        return Err(ApiError::bad_request("missing type"));
    }
    if let Some(upload_type) = &req.upload_type {
        debug!(build_id, "Client requested upload type {upload_type}");
    }

    let registered = state
        .engine
        .register_build_file(&user, build_id, &req.kind, req.sub_type.as_deref())
        .await?;

    Ok(Json(CreateBuildFileResponse {
        file: registered.into(),
    }))
}

pub async fn finalize_build_file(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(String, String)>,
    WharfBody(req): WharfBody<FinalizeBuildFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let build_id = parse_id(&id, "build")?;
    let file_id = parse_id(&file_id, "file")?;

    let file = state
        .engine
        .finalize_build_file(&user, build_id, file_id, req.size)
        .await?;

    Ok(Json(FinalizeBuildFileResponse {
        file: FinalizedFile {
            id: file.id,
            size: file.size,
            state: file.state,
        },
    }))
}

pub async fn download_build_file(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let build_id = parse_id(&id, "build")?;
    let file_id = parse_id(&file_id, "file")?;

    let url = state.engine.download_url(&user, build_id, file_id).await?;

    Ok(Redirect::temporary(&url))
}
