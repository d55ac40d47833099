use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::schema::SCHEMA;
use super::{ClaimedChannel, NewBuild, NewBuildFile, NewGame, NewUpload, NewUser, Store};
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str =
    "id, username, display_name, role, is_active, key_lookup, key_hash, created_at, updated_at";
const GAME_COLUMNS: &str =
    "id, user_id, title, short_text, type, classification, created_at, updated_at";
const UPLOAD_COLUMNS: &str =
    "id, game_id, filename, display_name, storage, type, platforms, created_at, updated_at";
const BUILD_COLUMNS: &str =
    "id, upload_id, user_version, parent_build_id, state, created_at, updated_at";
const BUILD_FILE_COLUMNS: &str =
    "id, build_id, type, sub_type, size, state, storage_path, created_at, updated_at";
const CHANNEL_COLUMNS: &str =
    "id, name, upload_id, current_build_id, version, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure(conn)
    }

    /// Opens a private in-memory database. Used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn now() -> String {
    format_datetime(&Utc::now())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: parse_column(row, 3)?,
        is_active: row.get(4)?,
        key_lookup: row.get(5)?,
        key_hash: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        short_text: row.get(3)?,
        kind: row.get(4)?,
        classification: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn upload_from_row(row: &Row<'_>) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        game_id: row.get(1)?,
        filename: row.get(2)?,
        display_name: row.get(3)?,
        storage: row.get(4)?,
        kind: row.get(5)?,
        platforms: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn build_from_row(row: &Row<'_>) -> rusqlite::Result<Build> {
    Ok(Build {
        id: row.get(0)?,
        upload_id: row.get(1)?,
        user_version: row.get(2)?,
        parent_build_id: row.get(3)?,
        state: parse_column(row, 4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn build_file_from_row(row: &Row<'_>) -> rusqlite::Result<BuildFile> {
    Ok(BuildFile {
        id: row.get(0)?,
        build_id: row.get(1)?,
        kind: row.get(2)?,
        sub_type: row.get(3)?,
        size: row.get(4)?,
        state: parse_column(row, 5)?,
        storage_path: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        upload_id: row.get(2)?,
        current_build_id: row.get(3)?,
        version: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn archive_retry_from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveRetry> {
    Ok(ArchiveRetry {
        build_id: row.get(0)?,
        last_error: row.get(1)?,
        attempts: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Maps unique-constraint failures to [`Error::AlreadyExists`].
fn map_insert_error(e: rusqlite::Error) -> Error {
    if is_constraint_violation(&e) {
        Error::AlreadyExists
    } else {
        Error::from(e)
    }
}

impl SqliteStore {
    fn query_one<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let conn = self.conn();
        conn.query_row(sql, params, map)
            .optional()
            .map_err(Error::from)
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &NewUser) -> Result<User> {
        let ts = now();
        let result = self.conn().query_row(
            &format!(
                "INSERT INTO users (username, display_name, role, is_active, key_lookup, key_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?6)
                 RETURNING {USER_COLUMNS}"
            ),
            params![
                user.username,
                user.display_name,
                user.role.as_str(),
                user.key_lookup,
                user.key_hash,
                ts,
            ],
            user_from_row,
        );

        match result {
            Ok(user) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("key_lookup") =>
            {
                Err(Error::KeyLookupCollision)
            }
            Err(e) => Err(map_insert_error(e)),
        }
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
    }

    fn get_user_by_key_lookup(&self, lookup: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE key_lookup = ?1"),
            params![lookup],
            user_from_row,
        )
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.query_all(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"),
            [],
            user_from_row,
        )
    }

    fn set_user_active(&self, username: &str, active: bool) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE username = ?3",
            params![active, now(), username],
        )?;
        Ok(rows > 0)
    }

    // Game operations

    fn create_game(&self, game: &NewGame) -> Result<Game> {
        let ts = now();
        self.conn()
            .query_row(
                &format!(
                    "INSERT INTO games (user_id, title, type, classification, created_at, updated_at)
                     VALUES (?1, ?2, 'default', 'game', ?3, ?3)
                     RETURNING {GAME_COLUMNS}"
                ),
                params![game.user_id, game.title, ts],
                game_from_row,
            )
            .map_err(map_insert_error)
    }

    fn get_game(&self, id: i64) -> Result<Option<Game>> {
        self.query_one(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"),
            params![id],
            game_from_row,
        )
    }

    fn get_game_by_owner_and_title(&self, user_id: i64, title: &str) -> Result<Option<Game>> {
        self.query_one(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE user_id = ?1 AND title = ?2"),
            params![user_id, title],
            game_from_row,
        )
    }

    fn list_user_games(&self, user_id: i64) -> Result<Vec<Game>> {
        self.query_all(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE user_id = ?1 ORDER BY id"),
            params![user_id],
            game_from_row,
        )
    }

    // Upload operations

    fn claim_channel(&self, upload: &NewUpload, name: &str) -> Result<ClaimedChannel> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels
                     WHERE name = ?2 AND upload_id IN (SELECT id FROM uploads WHERE game_id = ?1)
                     ORDER BY upload_id LIMIT 1"
                ),
                params![upload.game_id, name],
                channel_from_row,
            )
            .optional()?;

        if let Some(channel) = existing {
            let upload = tx.query_row(
                &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?1"),
                params![channel.upload_id],
                upload_from_row,
            )?;
            tx.commit()?;
            return Ok(ClaimedChannel {
                upload,
                channel,
                created: false,
            });
        }

        let ts = now();
        let upload = tx
            .query_row(
                &format!(
                    "INSERT INTO uploads (game_id, filename, display_name, storage, type, platforms, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'hosted', 'default', ?4, ?5, ?5)
                     RETURNING {UPLOAD_COLUMNS}"
                ),
                params![
                    upload.game_id,
                    upload.filename,
                    upload.display_name,
                    upload.platforms,
                    ts,
                ],
                upload_from_row,
            )
            .map_err(map_insert_error)?;
        let channel = tx
            .query_row(
                &format!(
                    "INSERT INTO channels (name, upload_id, current_build_id, version, created_at, updated_at)
                     VALUES (?1, ?2, NULL, 0, ?3, ?3)
                     RETURNING {CHANNEL_COLUMNS}"
                ),
                params![name, upload.id, ts],
                channel_from_row,
            )
            .map_err(map_insert_error)?;
        tx.commit()?;

        Ok(ClaimedChannel {
            upload,
            channel,
            created: true,
        })
    }

    fn get_upload(&self, id: i64) -> Result<Option<Upload>> {
        self.query_one(
            &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?1"),
            params![id],
            upload_from_row,
        )
    }

    fn list_game_uploads(&self, game_id: i64) -> Result<Vec<Upload>> {
        self.query_all(
            &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE game_id = ?1 ORDER BY id"),
            params![game_id],
            upload_from_row,
        )
    }

    // Build operations

    fn create_build(&self, build: &NewBuild) -> Result<Build> {
        let ts = now();
        self.conn()
            .query_row(
                &format!(
                    "INSERT INTO builds (upload_id, user_version, parent_build_id, state, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'started', ?4, ?4)
                     RETURNING {BUILD_COLUMNS}"
                ),
                params![build.upload_id, build.user_version, build.parent_build_id, ts],
                build_from_row,
            )
            .map_err(map_insert_error)
    }

    fn get_build(&self, id: i64) -> Result<Option<Build>> {
        self.query_one(
            &format!("SELECT {BUILD_COLUMNS} FROM builds WHERE id = ?1"),
            params![id],
            build_from_row,
        )
    }

    fn list_upload_builds(&self, upload_id: i64) -> Result<Vec<Build>> {
        self.query_all(
            &format!("SELECT {BUILD_COLUMNS} FROM builds WHERE upload_id = ?1 ORDER BY id DESC"),
            params![upload_id],
            build_from_row,
        )
    }

    fn transition_build_state(&self, id: i64, from: BuildState, to: BuildState) -> Result<bool> {
        if to <= from {
            return Err(Error::InvalidValue(format!(
                "build state cannot move from {from} to {to}"
            )));
        }

        let rows = self.conn().execute(
            "UPDATE builds SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
            params![to.as_str(), now(), id, from.as_str()],
        )?;
        Ok(rows == 1)
    }

    // Build file operations

    fn create_build_file(&self, file: &NewBuildFile) -> Result<BuildFile> {
        let ts = now();
        self.conn()
            .query_row(
                &format!(
                    "INSERT INTO build_files (build_id, type, sub_type, size, state, storage_path, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 0, 'uploading', ?4, ?5, ?5)
                     RETURNING {BUILD_FILE_COLUMNS}"
                ),
                params![file.build_id, file.kind, file.sub_type, file.storage_path, ts],
                build_file_from_row,
            )
            .map_err(map_insert_error)
    }

    fn get_build_file(&self, id: i64) -> Result<Option<BuildFile>> {
        self.query_one(
            &format!("SELECT {BUILD_FILE_COLUMNS} FROM build_files WHERE id = ?1"),
            params![id],
            build_file_from_row,
        )
    }

    fn list_build_files(&self, build_id: i64) -> Result<Vec<BuildFile>> {
        self.query_all(
            &format!("SELECT {BUILD_FILE_COLUMNS} FROM build_files WHERE build_id = ?1 ORDER BY id"),
            params![build_id],
            build_file_from_row,
        )
    }

    fn mark_build_file_uploaded(&self, id: i64, size: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE build_files SET size = ?1, state = 'uploaded', updated_at = ?2 WHERE id = ?3",
            params![size, now(), id],
        )?;
        Ok(rows > 0)
    }

    fn complete_build_file(&self, id: i64, storage_path: &str, size: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE build_files SET storage_path = ?1, size = ?2, state = 'uploaded', updated_at = ?3
             WHERE id = ?4",
            params![storage_path, size, now(), id],
        )?;
        Ok(rows > 0)
    }

    fn delete_build_file(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM build_files WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Channel operations

    fn get_channel(&self, upload_id: i64, name: &str) -> Result<Option<Channel>> {
        self.query_one(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE upload_id = ?1 AND name = ?2"),
            params![upload_id, name],
            channel_from_row,
        )
    }

    fn list_upload_channels(&self, upload_id: i64) -> Result<Vec<Channel>> {
        self.query_all(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE upload_id = ?1 ORDER BY id"),
            params![upload_id],
            channel_from_row,
        )
    }

    fn update_channel_pointer(
        &self,
        id: i64,
        expected_version: i64,
        build_id: i64,
    ) -> Result<bool> {
        // The build must belong to the channel's upload.
        let rows = self.conn().execute(
            "UPDATE channels SET current_build_id = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4
               AND upload_id = (SELECT upload_id FROM builds WHERE id = ?1)",
            params![build_id, now(), id, expected_version],
        )?;
        Ok(rows == 1)
    }

    // Archive retry ledger

    fn record_archive_failure(&self, build_id: i64, error: &str) -> Result<()> {
        let ts = now();
        self.conn().execute(
            "INSERT INTO archive_retries (build_id, last_error, attempts, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(build_id) DO UPDATE SET
                last_error = excluded.last_error,
                attempts = attempts + 1,
                updated_at = excluded.updated_at",
            params![build_id, error, ts],
        )?;
        Ok(())
    }

    fn list_archive_retries(&self) -> Result<Vec<ArchiveRetry>> {
        self.query_all(
            "SELECT build_id, last_error, attempts, created_at, updated_at
             FROM archive_retries ORDER BY build_id",
            [],
            archive_retry_from_row,
        )
    }

    fn clear_archive_retry(&self, build_id: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM archive_retries WHERE build_id = ?1",
            params![build_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    fn user(store: &SqliteStore, username: &str) -> User {
        store
            .create_user(&NewUser {
                username: username.to_string(),
                display_name: username.to_string(),
                role: Role::Member,
                key_lookup: format!("{username:0>8}"),
                key_hash: "hash".to_string(),
            })
            .unwrap()
    }

    fn new_upload(game_id: i64) -> NewUpload {
        NewUpload {
            game_id,
            filename: "demo.zip".to_string(),
            display_name: "demo".to_string(),
            platforms: "[]".to_string(),
        }
    }

    fn build_on_new_upload(store: &SqliteStore) -> (Upload, Build) {
        let owner = user(store, "alice");
        let game = store
            .create_game(&NewGame {
                user_id: owner.id,
                title: "demo".to_string(),
            })
            .unwrap();
        let upload = store.claim_channel(&new_upload(game.id), "main").unwrap().upload;
        let build = store
            .create_build(&NewBuild {
                upload_id: upload.id,
                user_version: "1.0".to_string(),
                parent_build_id: None,
            })
            .unwrap();
        (upload, build)
    }

    #[test]
    fn test_create_user_assigns_ids_and_defaults() {
        let store = store();
        let first = user(&store, "alice");
        let second = user(&store, "bob");

        assert!(second.id > first.id);
        assert!(first.is_active);
        assert_eq!(first.role, Role::Member);
        assert_eq!(
            store.get_user_by_username("bob").unwrap().unwrap().id,
            second.id
        );
    }

    #[test]
    fn test_duplicate_username_is_already_exists() {
        let store = store();
        user(&store, "alice");

        let result = store.create_user(&NewUser {
            username: "alice".to_string(),
            display_name: "alice".to_string(),
            role: Role::Admin,
            key_lookup: "zzzzzzzz".to_string(),
            key_hash: "hash".to_string(),
        });
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_duplicate_key_lookup_is_collision() {
        let store = store();
        user(&store, "alice");

        let result = store.create_user(&NewUser {
            username: "carol".to_string(),
            display_name: "carol".to_string(),
            role: Role::Member,
            key_lookup: "000alice".to_string(),
            key_hash: "hash".to_string(),
        });
        assert!(matches!(result, Err(Error::KeyLookupCollision)));
    }

    #[test]
    fn test_game_title_unique_per_owner() {
        let store = store();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");

        let game = NewGame {
            user_id: alice.id,
            title: "demo".to_string(),
        };
        store.create_game(&game).unwrap();
        assert!(matches!(store.create_game(&game), Err(Error::AlreadyExists)));

        store
            .create_game(&NewGame {
                user_id: bob.id,
                title: "demo".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_transition_build_state_is_compare_and_swap() {
        let store = store();
        let (_, build) = build_on_new_upload(&store);

        assert!(
            store
                .transition_build_state(build.id, BuildState::Started, BuildState::Processing)
                .unwrap()
        );
        assert!(
            !store
                .transition_build_state(build.id, BuildState::Started, BuildState::Processing)
                .unwrap()
        );
        assert!(
            store
                .transition_build_state(build.id, BuildState::Processing, BuildState::Completed)
                .unwrap()
        );
        assert_eq!(
            store.get_build(build.id).unwrap().unwrap().state,
            BuildState::Completed
        );
    }

    #[test]
    fn test_transition_build_state_rejects_regression() {
        let store = store();
        let (_, build) = build_on_new_upload(&store);

        assert!(
            store
                .transition_build_state(build.id, BuildState::Completed, BuildState::Started)
                .is_err()
        );
    }

    #[test]
    fn test_mark_build_file_uploaded_sets_size_and_state() {
        let store = store();
        let (_, build) = build_on_new_upload(&store);

        let file = store
            .create_build_file(&NewBuildFile {
                build_id: build.id,
                kind: "archive".to_string(),
                sub_type: "default".to_string(),
                storage_path: "builds/1/archive_default_x".to_string(),
            })
            .unwrap();
        assert_eq!(file.state, BuildFileState::Uploading);

        assert!(store.mark_build_file_uploaded(file.id, 1024).unwrap());

        let file = store.get_build_file(file.id).unwrap().unwrap();
        assert_eq!(file.state, BuildFileState::Uploaded);
        assert_eq!(file.size, 1024);
    }

    #[test]
    fn test_claim_channel_creates_empty_channel_once() {
        let store = store();
        let (upload, _) = build_on_new_upload(&store);

        let again = store.claim_channel(&new_upload(upload.game_id), "main").unwrap();
        assert!(!again.created);
        assert_eq!(again.upload.id, upload.id);
        assert_eq!(again.channel.current_build_id, None);
        assert_eq!(again.channel.version, 0);

        let beta = store.claim_channel(&new_upload(upload.game_id), "beta").unwrap();
        assert!(beta.created);
        assert_ne!(beta.upload.id, upload.id);
        assert_eq!(store.list_game_uploads(upload.game_id).unwrap().len(), 2);
    }

    #[test]
    fn test_channel_pointer_update_checks_version() {
        let store = store();
        let (upload, first) = build_on_new_upload(&store);

        let channel = store.get_channel(upload.id, "main").unwrap().unwrap();
        assert!(
            store
                .update_channel_pointer(channel.id, channel.version, first.id)
                .unwrap()
        );
        let second = store
            .create_build(&NewBuild {
                upload_id: upload.id,
                user_version: "1.1".to_string(),
                parent_build_id: Some(first.id),
            })
            .unwrap();

        // Stale version
        assert!(
            !store
                .update_channel_pointer(channel.id, channel.version, second.id)
                .unwrap()
        );
        assert!(
            store
                .update_channel_pointer(channel.id, channel.version + 1, second.id)
                .unwrap()
        );

        let channel = store.get_channel(upload.id, "main").unwrap().unwrap();
        assert_eq!(channel.current_build_id, Some(second.id));
        assert_eq!(channel.version, 2);
    }

    #[test]
    fn test_channel_pointer_rejects_build_of_other_upload() {
        let store = store();
        let (upload, _) = build_on_new_upload(&store);
        let channel = store.get_channel(upload.id, "main").unwrap().unwrap();

        let other_upload = store
            .claim_channel(&new_upload(upload.game_id), "beta")
            .unwrap()
            .upload;
        let foreign = store
            .create_build(&NewBuild {
                upload_id: other_upload.id,
                user_version: String::new(),
                parent_build_id: None,
            })
            .unwrap();

        assert!(
            !store
                .update_channel_pointer(channel.id, channel.version, foreign.id)
                .unwrap()
        );
    }

    #[test]
    fn test_claim_channel_from_many_threads_yields_one_upload() {
        let store = std::sync::Arc::new(store());
        let owner = user(&store, "alice");
        let game = store
            .create_game(&NewGame {
                user_id: owner.id,
                title: "demo".to_string(),
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || store.claim_channel(&new_upload(game.id), "main").unwrap())
            })
            .collect();
        let claims: Vec<ClaimedChannel> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(claims.iter().filter(|c| c.created).count(), 1);
        assert!(claims.iter().all(|c| c.upload.id == claims[0].upload.id));
        assert_eq!(store.list_game_uploads(game.id).unwrap().len(), 1);
    }

    #[test]
    fn test_archive_retry_ledger_counts_attempts() {
        let store = store();
        let (_, build) = build_on_new_upload(&store);

        store.record_archive_failure(build.id, "first").unwrap();
        store.record_archive_failure(build.id, "second").unwrap();

        let retries = store.list_archive_retries().unwrap();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].attempts, 2);
        assert_eq!(retries[0].last_error, "second");

        assert!(store.clear_archive_retry(build.id).unwrap());
        assert!(store.list_archive_retries().unwrap().is_empty());
    }
}
