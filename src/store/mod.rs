mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub key_lookup: String,
    pub key_hash: String,
}

pub struct NewGame {
    pub user_id: i64,
    pub title: String,
}

pub struct NewUpload {
    pub game_id: i64,
    pub filename: String,
    pub display_name: String,
    pub platforms: String,
}

/// Result of [`Store::claim_channel`].
pub struct ClaimedChannel {
    pub upload: Upload,
    pub channel: Channel,
    /// True when the upload and channel were created by this call.
    pub created: bool,
}

pub struct NewBuild {
    pub upload_id: i64,
    pub user_version: String,
    pub parent_build_id: Option<i64>,
}

pub struct NewBuildFile {
    pub build_id: i64,
    pub kind: String,
    pub sub_type: String,
    pub storage_path: String,
}

/// Store defines the persistence gateway.
///
/// Lookups return `Ok(None)` when the entity is absent so callers can tell
/// not-found apart from a failing database. Creates that would violate a
/// uniqueness rule return [`crate::error::Error::AlreadyExists`].
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &NewUser) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn get_user_by_key_lookup(&self, lookup: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn set_user_active(&self, username: &str, active: bool) -> Result<bool>;

    // Game operations
    fn create_game(&self, game: &NewGame) -> Result<Game>;
    fn get_game(&self, id: i64) -> Result<Option<Game>>;
    fn get_game_by_owner_and_title(&self, user_id: i64, title: &str) -> Result<Option<Game>>;
    fn list_user_games(&self, user_id: i64) -> Result<Vec<Game>>;

    // Upload operations
    /// Finds the first upload of `upload.game_id` carrying a channel named
    /// `name`, or creates the upload together with an empty channel.
    /// Lookup and creation happen in one transaction, so a channel name maps
    /// to at most one upload per game.
    fn claim_channel(&self, upload: &NewUpload, name: &str) -> Result<ClaimedChannel>;
    fn get_upload(&self, id: i64) -> Result<Option<Upload>>;
    fn list_game_uploads(&self, game_id: i64) -> Result<Vec<Upload>>;

    // Build operations
    fn create_build(&self, build: &NewBuild) -> Result<Build>;
    fn get_build(&self, id: i64) -> Result<Option<Build>>;
    fn list_upload_builds(&self, upload_id: i64) -> Result<Vec<Build>>;
    /// Moves a build from `from` to `to` only if it is currently in `from`.
    /// Returns false when another writer got there first.
    fn transition_build_state(&self, id: i64, from: BuildState, to: BuildState) -> Result<bool>;

    // Build file operations
    fn create_build_file(&self, file: &NewBuildFile) -> Result<BuildFile>;
    fn get_build_file(&self, id: i64) -> Result<Option<BuildFile>>;
    fn list_build_files(&self, build_id: i64) -> Result<Vec<BuildFile>>;
    /// Records the verified size and the uploaded state in one write.
    fn mark_build_file_uploaded(&self, id: i64, size: i64) -> Result<bool>;
    /// Like [`Store::mark_build_file_uploaded`], also replacing the storage path.
    fn complete_build_file(&self, id: i64, storage_path: &str, size: i64) -> Result<bool>;
    fn delete_build_file(&self, id: i64) -> Result<bool>;

    // Channel operations
    fn get_channel(&self, upload_id: i64, name: &str) -> Result<Option<Channel>>;
    fn list_upload_channels(&self, upload_id: i64) -> Result<Vec<Channel>>;
    /// Points a channel at `build_id` if its version still equals `expected_version`.
    fn update_channel_pointer(
        &self,
        id: i64,
        expected_version: i64,
        build_id: i64,
    ) -> Result<bool>;

    // Archive retry ledger
    fn record_archive_failure(&self, build_id: i64, error: &str) -> Result<()>;
    fn list_archive_retries(&self) -> Result<Vec<ArchiveRetry>>;
    fn clear_archive_retry(&self, build_id: i64) -> Result<bool>;
}
