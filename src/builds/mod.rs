//! Build lifecycle engine.
//!
//! A push creates a build on a channel, registers one or more files whose
//! bytes go straight to the blob store, and finalizes each file once the
//! client has uploaded it. When the last file lands the build moves
//! `started -> processing -> completed`, assembling a whole-build archive on
//! the way.

pub mod archive;
mod catalog;
mod channels;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use catalog::OwnedGame;
pub use channels::ChannelHead;

use crate::auth::can_access;
use crate::blob::{BlobError, BlobStore};
use crate::error::Error;
use crate::store::{NewBuild, NewBuildFile, NewGame, Store};
use crate::types::{Build, BuildFile, BuildFileState, BuildState, Game, User};
use crate::validation::validate_game_title;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    MalformedInput(String),
    #[error("access denied")]
    AccessDenied,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    UploadVerificationFailed(String),
    #[error("blob store timed out, retry later")]
    Timeout,
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    fn internal(context: &str, e: impl fmt::Display) -> Self {
        Self::Internal(format!("{context}: {e}"))
    }
}

/// Wraps store failures with the operation that hit them.
pub(crate) trait StoreContext<T> {
    fn context(self, context: &'static str) -> Result<T, EngineError>;
}

impl<T> StoreContext<T> for crate::error::Result<T> {
    fn context(self, context: &'static str) -> Result<T, EngineError> {
        self.map_err(|e| match e {
            Error::NotFound => EngineError::NotFound("entity"),
            e => EngineError::internal(context, e),
        })
    }
}

/// A `namespace/game` pair as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub game: String,
}

impl FromStr for Target {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(game), None) if !namespace.is_empty() && !game.is_empty() => {
                validate_game_title(game).map_err(EngineError::MalformedInput)?;
                Ok(Target {
                    namespace: namespace.to_string(),
                    game: game.to_string(),
                })
            }
            _ => Err(EngineError::MalformedInput(format!(
                "invalid target '{s}', expected namespace/game"
            ))),
        }
    }
}

/// A freshly registered file plus the capability to upload its bytes.
#[derive(Debug, Clone)]
pub struct RegisteredFile {
    pub file: BuildFile,
    pub upload_url: String,
    pub upload_headers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub rebuilt: usize,
}

#[derive(Clone)]
pub struct BuildEngine {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    presign_ttl: Duration,
    blob_timeout: Duration,
}

impl BuildEngine {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        presign_ttl: Duration,
        blob_timeout: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            presign_ttl,
            blob_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, BlobError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.blob_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::internal(operation, e)),
            Err(_) => {
                warn!("Blob store {operation} exceeded {:?}", self.blob_timeout);
                Err(EngineError::Timeout)
            }
        }
    }

    /// Starts a new build on `channel` of `target`, creating the game,
    /// upload and channel on first use.
    pub async fn create_build(
        &self,
        actor: &User,
        target: &str,
        channel: &str,
        user_version: &str,
    ) -> Result<Build, EngineError> {
        let target: Target = target.parse()?;
        if channel.is_empty() {
            return Err(EngineError::MalformedInput("channel is required".into()));
        }

        if !can_access(actor, &target.namespace) {
            return Err(EngineError::AccessDenied);
        }

        let owner = self
            .store
            .get_user_by_username(&target.namespace)
            .context("failed to look up namespace")?
            .ok_or(EngineError::NotFound("namespace"))?;

        let game = self.resolve_game(&owner, &target.game)?;
        let (upload, observed) = channels::resolve_upload(self.store.as_ref(), &game, channel)?;

        let parent_build_id = observed.current_build_id;

        let build = self
            .store
            .create_build(&NewBuild {
                upload_id: upload.id,
                user_version: user_version.to_string(),
                parent_build_id,
            })
            .context("failed to create build")?;

        channels::point_channel(self.store.as_ref(), observed, build.id)?;

        info!(
            build_id = build.id,
            upload_id = upload.id,
            parent = ?parent_build_id,
            "Created build for {}/{} on channel {channel}",
            target.namespace,
            target.game
        );

        Ok(build)
    }

    /// Games are keyed by (owner, title); a concurrent create falls back to
    /// the row that won.
    fn resolve_game(&self, owner: &User, title: &str) -> Result<Game, EngineError> {
        if let Some(game) = self
            .store
            .get_game_by_owner_and_title(owner.id, title)
            .context("failed to look up game")?
        {
            return Ok(game);
        }

        match self.store.create_game(&NewGame {
            user_id: owner.id,
            title: title.to_string(),
        }) {
            Ok(game) => {
                info!(game_id = game.id, "Created game {}/{title}", owner.username);
                Ok(game)
            }
            Err(Error::AlreadyExists) => self
                .store
                .get_game_by_owner_and_title(owner.id, title)
                .context("failed to look up game")?
                .ok_or(EngineError::NotFound("game")),
            Err(e) => Err(EngineError::internal("failed to create game", e)),
        }
    }

    /// Loads a build and checks the actor may act in its namespace.
    pub fn authorize_build(&self, actor: &User, build_id: i64) -> Result<Build, EngineError> {
        let build = self
            .store
            .get_build(build_id)
            .context("failed to load build")?
            .ok_or(EngineError::NotFound("build"))?;

        self.authorize_upload(actor, build.upload_id)?;

        Ok(build)
    }

    pub fn list_build_files(&self, actor: &User, build_id: i64) -> Result<Vec<BuildFile>, EngineError> {
        self.authorize_build(actor, build_id)?;
        self.store
            .list_build_files(build_id)
            .context("failed to list build files")
    }

    fn file_of_build(&self, build_id: i64, file_id: i64) -> Result<BuildFile, EngineError> {
        let file = self
            .store
            .get_build_file(file_id)
            .context("failed to load build file")?
            .ok_or(EngineError::NotFound("build file"))?;

        if file.build_id != build_id {
            return Err(EngineError::MalformedInput(
                "build file does not belong to build".into(),
            ));
        }

        Ok(file)
    }

    /// Allocates a storage path and hands back a presigned upload URL.
    ///
    /// The URL is issued before the row is written so a blob store failure
    /// leaves no `uploading` file behind to stall completion.
    pub async fn register_build_file(
        &self,
        actor: &User,
        build_id: i64,
        kind: &str,
        sub_type: Option<&str>,
    ) -> Result<RegisteredFile, EngineError> {
        self.authorize_build(actor, build_id)?;

        let sub_type = sub_type
            .filter(|s| !s.is_empty())
            .unwrap_or(archive::DEFAULT_SUB_TYPE);
        validate_classifier("type", kind)?;
        validate_classifier("sub_type", sub_type)?;

        let storage_path = format!("builds/{build_id}/{kind}_{sub_type}_{}", Uuid::new_v4());
        let upload_url = self
            .bounded(
                "presign_upload",
                self.blobs.presign_upload(&storage_path, self.presign_ttl),
            )
            .await?;

        let file = self
            .store
            .create_build_file(&NewBuildFile {
                build_id,
                kind: kind.to_string(),
                sub_type: sub_type.to_string(),
                storage_path,
            })
            .context("failed to create build file")?;

        info!(build_id, file_id = file.id, "Registered {kind}/{sub_type} build file");

        let upload_headers =
            BTreeMap::from([("Content-Type".to_string(), "application/octet-stream".to_string())]);

        Ok(RegisteredFile {
            file,
            upload_url,
            upload_headers,
        })
    }

    /// Confirms the object landed, records its real size, then checks
    /// whether the build is complete.
    pub async fn finalize_build_file(
        &self,
        actor: &User,
        build_id: i64,
        file_id: i64,
        declared_size: Option<i64>,
    ) -> Result<BuildFile, EngineError> {
        self.authorize_build(actor, build_id)?;
        let file = self.file_of_build(build_id, file_id)?;

        let stat = self
            .bounded("stat", self.blobs.stat(&file.storage_path))
            .await?
            .ok_or_else(|| {
                EngineError::UploadVerificationFailed(format!(
                    "upload for build file {file_id} did not land"
                ))
            })?;

        let size = i64::try_from(stat.size)
            .map_err(|_| EngineError::UploadVerificationFailed("object too large".into()))?;
        if let Some(declared) = declared_size.filter(|d| *d != size) {
            warn!(build_id, file_id, declared, size, "Declared size differs from stored object");
        }

        self.store
            .mark_build_file_uploaded(file_id, size)
            .context("failed to finalize build file")?;

        // Run on its own task so a dropped request cannot cut the
        // processing -> completed sequence short.
        let engine = self.clone();
        tokio::spawn(async move { engine.evaluate_completion(build_id).await })
            .await
            .map_err(|e| EngineError::internal("completion task failed", e))??;

        self.store
            .get_build_file(file_id)
            .context("failed to reload build file")?
            .ok_or(EngineError::NotFound("build file"))
    }

    /// Advances a build whose files have all landed. Safe to call any number
    /// of times; the started -> processing step is a compare-and-swap, so at
    /// most one caller ever assembles the archive.
    pub async fn evaluate_completion(&self, build_id: i64) -> Result<(), EngineError> {
        let build = self
            .store
            .get_build(build_id)
            .context("failed to load build")?
            .ok_or(EngineError::NotFound("build"))?;
        if build.state != BuildState::Started {
            return Ok(());
        }

        let files = self
            .store
            .list_build_files(build_id)
            .context("failed to list build files")?;
        if files.is_empty() || files.iter().any(|f| f.state != BuildFileState::Uploaded) {
            return Ok(());
        }

        if !self
            .store
            .transition_build_state(build_id, BuildState::Started, BuildState::Processing)
            .context("failed to start processing")?
        {
            return Ok(());
        }
        info!(build_id, "Build processing");

        if let Err(e) =
            archive::assemble(&self.store, &self.blobs, build_id, self.blob_timeout).await
        {
            error!(build_id, "Archive assembly failed, queued for retry: {e}");
            if let Err(e) = self.store.record_archive_failure(build_id, &e.to_string()) {
                error!(build_id, "Failed to record archive failure: {e}");
            }
        }

        self.complete_build(build_id)?;

        Ok(())
    }

    /// Moves a processing build to completed. Returns false when some other
    /// writer already moved it, which the started -> processing claim should
    /// rule out.
    fn complete_build(&self, build_id: i64) -> Result<bool, EngineError> {
        let moved = self
            .store
            .transition_build_state(build_id, BuildState::Processing, BuildState::Completed)
            .context("failed to complete build")?;

        if moved {
            info!(build_id, "Build completed");
        } else {
            warn!(build_id, "Build was no longer processing when completing it");
        }

        Ok(moved)
    }

    /// Re-runs archive assembly for builds recorded in the retry ledger.
    pub async fn retry_archives(&self) -> Result<RetrySummary, EngineError> {
        let pending = self
            .store
            .list_archive_retries()
            .context("failed to list archive retries")?;

        let mut summary = RetrySummary::default();
        for entry in pending {
            summary.attempted += 1;
            let build_id = entry.build_id;

            let files = self
                .store
                .list_build_files(build_id)
                .context("failed to list build files")?;
            let already_built = files
                .iter()
                .any(|f| archive::is_assembled(f) && f.state == BuildFileState::Uploaded);

            if !already_built {
                if let Err(e) =
                    archive::assemble(&self.store, &self.blobs, build_id, self.blob_timeout).await
                {
                    warn!(build_id, attempts = entry.attempts + 1, "Archive retry failed: {e}");
                    self.store
                        .record_archive_failure(build_id, &e.to_string())
                        .context("failed to record archive failure")?;
                    continue;
                }
                summary.rebuilt += 1;
            }

            self.store
                .clear_archive_retry(build_id)
                .context("failed to clear archive retry")?;
        }

        if summary.attempted > 0 {
            info!(
                attempted = summary.attempted,
                rebuilt = summary.rebuilt,
                "Processed archive retries"
            );
        }

        Ok(summary)
    }

    /// Resolves a time-bounded download URL for a stored build file.
    pub async fn download_url(
        &self,
        actor: &User,
        build_id: i64,
        file_id: i64,
    ) -> Result<String, EngineError> {
        self.authorize_build(actor, build_id)?;
        let file = self.file_of_build(build_id, file_id)?;

        self.bounded("stat", self.blobs.stat(&file.storage_path))
            .await?
            .ok_or(EngineError::NotFound("file in storage"))?;

        self.bounded(
            "presign_download",
            self.blobs.presign_download(&file.storage_path, self.presign_ttl),
        )
        .await
    }
}

fn validate_classifier(field: &str, value: &str) -> Result<(), EngineError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid || value.starts_with('.') {
        return Err(EngineError::MalformedInput(format!("invalid {field} '{value}'")));
    }
    Ok(())
}
