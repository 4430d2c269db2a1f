use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version. Bump this and add a new step whenever the schema
/// changes.
const CURRENT_VERSION: u32 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE CHECK (length(name) > 0),
                photo_url   TEXT NOT NULL DEFAULT ''
            );

            -- direct_key is '<lo>:<hi>' for direct conversations, NULL for groups.
            CREATE TABLE IF NOT EXISTS conversations (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL DEFAULT '',
                is_group        INTEGER NOT NULL CHECK (is_group IN (0, 1)),
                direct_key      TEXT UNIQUE,
                last_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
                photo_url       TEXT NOT NULL DEFAULT '',
                CHECK ((is_group = 0) = (direct_key IS NOT NULL))
            );

            CREATE TABLE IF NOT EXISTS conversation_members (
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_admin        INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_members_user
                ON conversation_members(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                reply_to_id     INTEGER REFERENCES messages(id) ON DELETE SET NULL,
                is_photo        INTEGER NOT NULL DEFAULT 0,
                is_forwarded    INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, timestamp);

            CREATE INDEX IF NOT EXISTS idx_messages_reply
                ON messages(reply_to_id);

            CREATE TABLE IF NOT EXISTS message_reactions (
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reaction    TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            PRAGMA user_version = 1;

            COMMIT;
            ",
        )?;
    }

    info!(
        "Database migrations complete (schema v{})",
        CURRENT_VERSION
    );
    Ok(())
}
