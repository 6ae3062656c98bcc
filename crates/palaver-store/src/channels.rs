//! CRUD operations for [`Channel`] records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

use palaver_shared::types::{ChannelArn, ChannelMode, ChannelPrivacy};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Channel;

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert a channel, or update it in place if the ARN already exists.
    ///
    /// `created_at` is preserved on conflict (first-seen timestamp), and
    /// membership flags only overwrite the stored value when the incoming
    /// channel actually carries one -- an absent flag means "not fetched",
    /// not "false".
    pub fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channels
                 (arn, name, privacy, mode, metadata, is_member, is_moderator, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(arn) DO UPDATE SET
                 name         = excluded.name,
                 privacy      = excluded.privacy,
                 mode         = excluded.mode,
                 metadata     = COALESCE(excluded.metadata, metadata),
                 is_member    = COALESCE(excluded.is_member, is_member),
                 is_moderator = COALESCE(excluded.is_moderator, is_moderator),
                 is_admin     = COALESCE(excluded.is_admin, is_admin)",
            params![
                channel.arn.as_str(),
                channel.name,
                channel.privacy.as_str(),
                channel.mode.as_str(),
                channel.metadata,
                channel.is_member,
                channel.is_moderator,
                channel.is_admin,
                channel
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single channel by ARN.
    pub fn get_channel(&self, arn: &ChannelArn) -> Result<Channel> {
        self.conn()
            .query_row(
                "SELECT arn, name, privacy, mode, metadata,
                        is_member, is_moderator, is_admin, created_at
                 FROM channels
                 WHERE arn = ?1",
                params![arn.as_str()],
                row_to_channel,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all channels, ordered by first-seen date descending.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(
            "SELECT arn, name, privacy, mode, metadata,
                    is_member, is_moderator, is_admin, created_at
             FROM channels
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a channel by ARN.  Returns `true` if a row was deleted.
    /// Messages cascade via the foreign key.
    pub fn delete_channel(&self, arn: &ChannelArn) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM channels WHERE arn = ?1",
            params![arn.as_str()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Channel`].
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let arn: String = row.get(0)?;
    let name: String = row.get(1)?;
    let privacy_str: String = row.get(2)?;
    let mode_str: String = row.get(3)?;
    let metadata: Option<String> = row.get(4)?;
    let is_member: Option<bool> = row.get(5)?;
    let is_moderator: Option<bool> = row.get(6)?;
    let is_admin: Option<bool> = row.get(7)?;
    let created_str: String = row.get(8)?;

    let privacy = ChannelPrivacy::parse(&privacy_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown privacy: {privacy_str}").into(),
        )
    })?;

    let mode = ChannelMode::parse(&mode_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown mode: {mode_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Channel {
        arn: ChannelArn(arn),
        name,
        privacy,
        mode,
        metadata,
        is_member,
        is_moderator,
        is_admin,
        created_at,
    })
}
