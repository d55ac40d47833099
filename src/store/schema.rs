pub const SCHEMA: &str = r#"
-- Users are namespaces: a namespace is the username string itself
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('member', 'admin')),
    is_active INTEGER NOT NULL DEFAULT 1,

    -- One api key per user; only the lookup prefix and an argon2id hash are kept
    key_lookup TEXT NOT NULL,
    key_hash TEXT NOT NULL,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Games always belong to the namespace owner, whoever created them
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    short_text TEXT,
    type TEXT NOT NULL DEFAULT 'default',
    classification TEXT NOT NULL DEFAULT 'game',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(user_id, title)
);

-- Uploads are deliverable lines within a game
CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    display_name TEXT NOT NULL,
    storage TEXT NOT NULL DEFAULT 'hosted',
    type TEXT NOT NULL DEFAULT 'default',
    platforms TEXT NOT NULL DEFAULT '[]',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    user_version TEXT NOT NULL DEFAULT '',
    parent_build_id INTEGER REFERENCES builds(id),
    state TEXT NOT NULL DEFAULT 'started' CHECK (state IN ('started', 'processing', 'completed')),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS build_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    build_id INTEGER NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    sub_type TEXT NOT NULL DEFAULT 'default',
    size INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'uploading' CHECK (state IN ('uploading', 'uploaded')),
    storage_path TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Channels point at the current build of one upload
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    current_build_id INTEGER REFERENCES builds(id),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(name, upload_id)
);

-- Builds whose archive could not be assembled
CREATE TABLE IF NOT EXISTS archive_retries (
    build_id INTEGER PRIMARY KEY REFERENCES builds(id) ON DELETE CASCADE,
    last_error TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_key_lookup ON users(key_lookup);
CREATE INDEX IF NOT EXISTS idx_games_user ON games(user_id);
CREATE INDEX IF NOT EXISTS idx_uploads_game ON uploads(game_id);
CREATE INDEX IF NOT EXISTS idx_builds_upload ON builds(upload_id);
CREATE INDEX IF NOT EXISTS idx_build_files_build ON build_files(build_id);
CREATE INDEX IF NOT EXISTS idx_channels_upload ON channels(upload_id);
"#;
