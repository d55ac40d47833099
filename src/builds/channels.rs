use tracing::debug;

use super::{BuildEngine, EngineError, StoreContext};
use crate::auth::can_access;
use crate::store::{NewUpload, Store};
use crate::types::{Build, Channel, Game, Upload, User};

const DEFAULT_PLATFORMS: &str = r#"["windows","linux","osx"]"#;

/// A channel together with the build it currently points at.
#[derive(Debug, Clone)]
pub struct ChannelHead {
    pub channel: Channel,
    pub head: Option<Build>,
}

impl BuildEngine {
    /// Every channel of every upload of `namespace/game`, in upload order.
    pub fn list_channels(
        &self,
        actor: &User,
        namespace: &str,
        game: &str,
    ) -> Result<Vec<ChannelHead>, EngineError> {
        let game = self.resolve_existing_game(actor, namespace, game)?;

        let mut heads = Vec::new();
        for upload in self
            .store
            .list_game_uploads(game.id)
            .context("failed to list uploads")?
        {
            for channel in self
                .store
                .list_upload_channels(upload.id)
                .context("failed to list channels")?
            {
                heads.push(self.with_head(channel)?);
            }
        }

        Ok(heads)
    }

    pub fn get_channel(
        &self,
        actor: &User,
        namespace: &str,
        game: &str,
        channel: &str,
    ) -> Result<ChannelHead, EngineError> {
        let game = self.resolve_existing_game(actor, namespace, game)?;

        let uploads = self
            .store
            .list_game_uploads(game.id)
            .context("failed to list uploads")?;

        match find_channel(self.store.as_ref(), &uploads, channel)? {
            Some((_, channel)) => self.with_head(channel),
            None => Err(EngineError::NotFound("channel")),
        }
    }

    fn resolve_existing_game(
        &self,
        actor: &User,
        namespace: &str,
        title: &str,
    ) -> Result<Game, EngineError> {
        if !can_access(actor, namespace) {
            return Err(EngineError::AccessDenied);
        }

        let owner = self
            .store
            .get_user_by_username(namespace)
            .context("failed to look up namespace")?
            .ok_or(EngineError::NotFound("namespace"))?;

        self.store
            .get_game_by_owner_and_title(owner.id, title)
            .context("failed to look up game")?
            .ok_or(EngineError::NotFound("game"))
    }

    fn with_head(&self, channel: Channel) -> Result<ChannelHead, EngineError> {
        let head = match channel.current_build_id {
            Some(id) => self.store.get_build(id).context("failed to load head build")?,
            None => None,
        };
        Ok(ChannelHead { channel, head })
    }
}

/// Linear scan over the game's uploads; the first upload that already
/// carries a channel with this name wins.
pub(super) fn find_channel(
    store: &dyn Store,
    uploads: &[Upload],
    name: &str,
) -> Result<Option<(Upload, Channel)>, EngineError> {
    for upload in uploads {
        if let Some(channel) = store
            .get_channel(upload.id, name)
            .context("failed to look up channel")?
        {
            return Ok(Some((upload.clone(), channel)));
        }
    }
    Ok(None)
}

/// Returns the upload serving `channel` for this game together with the
/// channel itself, creating both when no upload has that channel yet.
pub(super) fn resolve_upload(
    store: &dyn Store,
    game: &Game,
    channel: &str,
) -> Result<(Upload, Channel), EngineError> {
    let claimed = store
        .claim_channel(
            &NewUpload {
                game_id: game.id,
                filename: format!("{}.zip", game.title),
                display_name: game.title.clone(),
                platforms: DEFAULT_PLATFORMS.to_string(),
            },
            channel,
        )
        .context("failed to resolve upload")?;

    if claimed.created {
        tracing::info!(
            game_id = game.id,
            upload_id = claimed.upload.id,
            "Created upload for channel {channel}"
        );
    }

    Ok((claimed.upload, claimed.channel))
}

/// Moves the channel pointer to `build_id`.
///
/// Uses the channel's version as an optimistic lock. A pointer that already
/// references a newer build is left alone, so concurrent pushes settle on
/// the highest build id.
pub(super) fn point_channel(
    store: &dyn Store,
    observed: Channel,
    build_id: i64,
) -> Result<Channel, EngineError> {
    let (upload_id, name) = (observed.upload_id, observed.name.clone());
    let mut channel = observed;

    loop {
        if channel.current_build_id.is_some_and(|current| current >= build_id) {
            return Ok(channel);
        }

        if store
            .update_channel_pointer(channel.id, channel.version, build_id)
            .context("failed to update channel")?
        {
            return reload(store, upload_id, &name);
        }

        let fresh = reload(store, upload_id, &name)?;
        if fresh.version == channel.version {
            // Version unchanged yet the update matched nothing: the build is
            // not part of this channel's upload.
            return Err(EngineError::Internal(format!(
                "channel {name} rejected build {build_id}"
            )));
        }

        debug!(channel_id = fresh.id, "Channel moved concurrently, retrying pointer update");
        channel = fresh;
    }
}

fn reload(store: &dyn Store, upload_id: i64, name: &str) -> Result<Channel, EngineError> {
    store
        .get_channel(upload_id, name)
        .context("failed to reload channel")?
        .ok_or(EngineError::NotFound("channel"))
}
