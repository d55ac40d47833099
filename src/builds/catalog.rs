//! Read access to games and uploads, checked against the owner's namespace.

use super::{BuildEngine, EngineError, StoreContext};
use crate::auth::can_access;
use crate::types::{Build, Game, Upload, User};

/// A game and the user whose namespace it lives in.
#[derive(Debug, Clone)]
pub struct OwnedGame {
    pub game: Game,
    pub owner: User,
}

impl BuildEngine {
    pub fn authorize_game(&self, actor: &User, game_id: i64) -> Result<OwnedGame, EngineError> {
        let game = self
            .store
            .get_game(game_id)
            .context("failed to load game")?
            .ok_or(EngineError::NotFound("game"))?;
        let owner = self
            .store
            .get_user(game.user_id)
            .context("failed to load game owner")?
            .ok_or(EngineError::NotFound("namespace"))?;

        if !can_access(actor, &owner.username) {
            return Err(EngineError::AccessDenied);
        }

        Ok(OwnedGame { game, owner })
    }

    pub fn authorize_upload(&self, actor: &User, upload_id: i64) -> Result<Upload, EngineError> {
        let upload = self
            .store
            .get_upload(upload_id)
            .context("failed to load upload")?
            .ok_or(EngineError::NotFound("upload"))?;

        self.authorize_game(actor, upload.game_id)?;

        Ok(upload)
    }

    pub fn list_game_uploads(&self, actor: &User, game_id: i64) -> Result<Vec<Upload>, EngineError> {
        self.authorize_game(actor, game_id)?;
        self.store
            .list_game_uploads(game_id)
            .context("failed to list uploads")
    }

    /// Newest build first.
    pub fn list_upload_builds(&self, actor: &User, upload_id: i64) -> Result<Vec<Build>, EngineError> {
        self.authorize_upload(actor, upload_id)?;
        self.store
            .list_upload_builds(upload_id)
            .context("failed to list builds")
    }
}
