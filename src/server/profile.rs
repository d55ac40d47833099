use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    BuildDetailResponse, BuildsResponse, GameResponse, GamesResponse, ProfileResponse,
    UploadResponse, UploadsResponse,
};
use crate::server::response::{ApiError, StoreResultExt};
use crate::server::wharf::parse_id;

pub fn profile_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/games", get(profile_games))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/uploads", get(game_uploads))
        .route("/uploads/{id}", get(get_upload))
        .route("/uploads/{id}/builds", get(upload_builds))
        .route("/builds/{id}", get(get_build))
}

async fn profile(RequireUser(user): RequireUser) -> impl IntoResponse {
    Json(ProfileResponse { user: user.into() })
}

async fn profile_games(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let games = state
        .store
        .list_user_games(user.id)
        .api_err("Failed to list games")?;

    Ok(Json(GamesResponse { games }))
}

async fn get_build(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let build_id = parse_id(&id, "build")?;
    let build = state.engine.authorize_build(&user, build_id)?;

    Ok(Json(BuildDetailResponse {
        build: build.into(),
    }))
}

async fn get_game(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let game_id = parse_id(&id, "game")?;
    let game = state.engine.authorize_game(&user, game_id)?;

    Ok(Json(GameResponse { game: game.into() }))
}

async fn game_uploads(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let game_id = parse_id(&id, "game")?;
    let uploads = state.engine.list_game_uploads(&user, game_id)?;

    Ok(Json(UploadsResponse {
        uploads: uploads.into_iter().map(Into::into).collect(),
    }))
}

async fn get_upload(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_id(&id, "upload")?;
    let upload = state.engine.authorize_upload(&user, upload_id)?;

    Ok(Json(UploadResponse {
        upload: upload.into(),
    }))
}

async fn upload_builds(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_id(&id, "upload")?;
    let builds = state.engine.list_upload_builds(&user, upload_id)?;

    Ok(Json(BuildsResponse {
        builds: builds.into_iter().map(Into::into).collect(),
    }))
}
