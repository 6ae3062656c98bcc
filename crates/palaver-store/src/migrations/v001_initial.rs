//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `channels`, `messages`, `contacts`, and
//! `app_settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    arn          TEXT PRIMARY KEY NOT NULL,  -- server-assigned ARN
    name         TEXT NOT NULL,
    privacy      TEXT NOT NULL DEFAULT 'public',
    mode         TEXT NOT NULL DEFAULT 'unrestricted',
    metadata     TEXT,                       -- free-text description
    is_member    INTEGER,                    -- nullable boolean, NULL = unknown
    is_moderator INTEGER,
    is_admin     INTEGER,
    created_at   TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    token               TEXT NOT NULL,       -- client correlation token
    channel_arn         TEXT NOT NULL,       -- FK -> channels(arn)
    message_id          TEXT,                -- server id, NULL until echoed
    kind                TEXT NOT NULL DEFAULT 'standard',
    body                TEXT NOT NULL,       -- text/image/file/audio/meeting_link
    content             TEXT,                -- text body or meeting url
    attachment_bytes    BLOB,
    attachment_url      TEXT,
    file_name           TEXT,
    audio_duration_secs INTEGER,
    sender_id           TEXT NOT NULL,
    sender_name         TEXT NOT NULL,
    sent_at             TEXT NOT NULL,       -- ISO-8601
    edited_at           TEXT,
    redacted            INTEGER NOT NULL DEFAULT 0,
    delivered           INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (channel_arn, token),
    FOREIGN KEY (channel_arn) REFERENCES channels(arn) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_sent
    ON messages(channel_arn, sent_at ASC);

-- server ids are unique within a channel once assigned
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_channel_server_id
    ON messages(channel_arn, message_id) WHERE message_id IS NOT NULL;

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    user_id      TEXT PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL,
    presence     TEXT NOT NULL DEFAULT 'unknown',
    created_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Settings (single JSON row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS app_settings (
    id   INTEGER PRIMARY KEY CHECK (id = 1),
    json TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
