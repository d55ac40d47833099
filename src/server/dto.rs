use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::builds::{ChannelHead, OwnedGame, RegisteredFile};
use crate::types::{Build, BuildFile, BuildFileState, BuildState, Game, Upload, User};

// Requests. The upload client sends these either form encoded or as JSON.

#[derive(Debug, Deserialize)]
pub struct CreateBuildRequest {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user_version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBuildFileRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    /// Sent by the client, always a direct upload here.
    #[serde(default)]
    pub upload_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinalizeBuildFileRequest {
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TargetParams {
    #[serde(default)]
    pub target: String,
}

// Wharf responses

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ParentBuildRef {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBuild {
    pub id: i64,
    pub upload_id: i64,
    pub user_version: String,
    pub state: BuildState,
    /// Absent, not null, on the first build of a channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_build: Option<ParentBuildRef>,
}

impl From<Build> for CreatedBuild {
    fn from(build: Build) -> Self {
        Self {
            id: build.id,
            upload_id: build.upload_id,
            user_version: build.user_version,
            state: build.state,
            parent_build: build.parent_build_id.map(|id| ParentBuildRef { id }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBuildResponse {
    pub build: CreatedBuild,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFileEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: String,
    pub size: i64,
    pub state: BuildFileState,
}

impl From<BuildFile> for BuildFileEntry {
    fn from(file: BuildFile) -> Self {
        Self {
            id: file.id,
            kind: file.kind,
            sub_type: file.sub_type,
            size: file.size,
            state: file.state,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuildFilesResponse {
    #[serde(rename = "Files")]
    pub files: Vec<BuildFileEntry>,
}

#[derive(Debug, Serialize)]
pub struct CreatedFile {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: String,
    pub state: BuildFileState,
    pub upload_url: String,
    pub upload_headers: BTreeMap<String, String>,
}

impl From<RegisteredFile> for CreatedFile {
    fn from(registered: RegisteredFile) -> Self {
        Self {
            id: registered.file.id,
            kind: registered.file.kind,
            sub_type: registered.file.sub_type,
            state: registered.file.state,
            upload_url: registered.upload_url,
            upload_headers: registered.upload_headers,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBuildFileResponse {
    pub file: CreatedFile,
}

#[derive(Debug, Serialize)]
pub struct FinalizedFile {
    pub id: i64,
    pub size: i64,
    pub state: BuildFileState,
}

#[derive(Debug, Serialize)]
pub struct FinalizeBuildFileResponse {
    pub file: FinalizedFile,
}

#[derive(Debug, Serialize)]
pub struct UploadRef {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct ChannelHeadBuild {
    pub id: i64,
    pub state: BuildState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_build_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub upload: UploadRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<ChannelHeadBuild>,
}

impl From<ChannelHead> for ChannelInfo {
    fn from(value: ChannelHead) -> Self {
        Self {
            name: value.channel.name,
            upload: UploadRef {
                id: value.channel.upload_id,
            },
            head: value.head.map(|build| ChannelHeadBuild {
                id: build.id,
                state: build.state,
                user_version: Some(build.user_version).filter(|v| !v.is_empty()),
                parent_build_id: build.parent_build_id,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub channels: BTreeMap<String, ChannelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub channel: ChannelInfo,
}

// Profile responses

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

impl From<User> for ProfileUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
}

#[derive(Debug, Serialize)]
pub struct GamesResponse {
    pub games: Vec<Game>,
}

#[derive(Debug, Serialize)]
pub struct BuildDetail {
    pub id: i64,
    pub upload_id: i64,
    pub user_version: String,
    pub state: BuildState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_build_id: Option<i64>,
}

impl From<Build> for BuildDetail {
    fn from(build: Build) -> Self {
        Self {
            id: build.id,
            upload_id: build.upload_id,
            user_version: build.user_version,
            state: build.state,
            created_at: build.created_at,
            parent_build_id: build.parent_build_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuildDetailResponse {
    pub build: BuildDetail,
}

#[derive(Debug, Serialize)]
pub struct BuildsResponse {
    pub builds: Vec<BuildDetail>,
}

// Catalog responses

#[derive(Debug, Serialize)]
pub struct GameDetail {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_text: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub classification: String,
    pub user: ProfileUser,
}

impl From<OwnedGame> for GameDetail {
    fn from(value: OwnedGame) -> Self {
        Self {
            id: value.game.id,
            title: value.game.title,
            short_text: value.game.short_text,
            kind: value.game.kind,
            classification: value.game.classification,
            user: value.owner.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GameResponse {
    pub game: GameDetail,
}

#[derive(Debug, Serialize)]
pub struct UploadDetail {
    pub id: i64,
    pub game_id: i64,
    pub filename: String,
    pub display_name: String,
    pub storage: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub platforms: String,
}

impl From<Upload> for UploadDetail {
    fn from(upload: Upload) -> Self {
        Self {
            id: upload.id,
            game_id: upload.game_id,
            filename: upload.filename,
            display_name: upload.display_name,
            storage: upload.storage,
            kind: upload.kind,
            platforms: upload.platforms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload: UploadDetail,
}

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub uploads: Vec<UploadDetail>,
}
