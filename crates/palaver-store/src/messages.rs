//! CRUD operations for [`Message`] records.
//!
//! Messages are keyed by `(channel_arn, token)` -- the client correlation
//! token is the only identity a locally-created message has until the server
//! echoes it back with a canonical id.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

use palaver_shared::types::{ChannelArn, MessageId, MetadataToken, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{AttachmentSource, Message, MessageBody, MessageKind, Sender};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let (content, attachment_bytes, attachment_url, file_name, duration) =
            body_columns(&message.body);

        self.conn().execute(
            "INSERT INTO messages
                 (token, channel_arn, message_id, kind, body, content,
                  attachment_bytes, attachment_url, file_name, audio_duration_secs,
                  sender_id, sender_name, sent_at, edited_at, redacted, delivered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                message.token.as_str(),
                message.channel_arn.as_str(),
                message.id.as_ref().map(|id| id.as_str()),
                message.kind.as_str(),
                message.body.tag(),
                content,
                attachment_bytes,
                attachment_url,
                file_name,
                duration,
                message.sender.id.as_str(),
                message.sender.display_name,
                to_sql_ts(&message.sent_at),
                message.edited_at.as_ref().map(to_sql_ts),
                message.redacted,
                message.delivered,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single message by its correlation token.
    pub fn get_message(&self, channel: &ChannelArn, token: &MetadataToken) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_MESSAGE} WHERE channel_arn = ?1 AND token = ?2"),
                params![channel.as_str(), token.as_str()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All messages for a channel, ordered by send time ascending.
    /// Ties keep insertion order (rowid).
    pub fn get_messages_for_channel(&self, channel: &ChannelArn) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE} WHERE channel_arn = ?1 ORDER BY sent_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![channel.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Record the server echo for a locally-created message: assign the
    /// canonical id and flip `delivered` to true.
    ///
    /// The `delivered = 0` guard makes the transition write at most one row
    /// exactly once -- replaying the same echo is a no-op. Returns whether a
    /// row was updated.
    pub fn confirm_delivery(
        &self,
        channel: &ChannelArn,
        token: &MetadataToken,
        message_id: &MessageId,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET message_id = ?3, delivered = 1
             WHERE channel_arn = ?1 AND token = ?2 AND delivered = 0",
            params![channel.as_str(), token.as_str(), message_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Replace the text content of a message after a local or remote edit.
    pub fn update_text_content(
        &self,
        channel: &ChannelArn,
        token: &MetadataToken,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?3, edited_at = ?4
             WHERE channel_arn = ?1 AND token = ?2 AND body = 'text'",
            params![
                channel.as_str(),
                token.as_str(),
                content,
                to_sql_ts(&edited_at)
            ],
        )?;
        Ok(affected > 0)
    }

    /// Mark a message as redacted by a moderator.
    pub fn set_redacted(&self, channel: &ChannelArn, token: &MetadataToken) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET redacted = 1 WHERE channel_arn = ?1 AND token = ?2",
            params![channel.as_str(), token.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Delete a message.  Returns `true` if a row was deleted.
    pub fn delete_message(&self, channel: &ChannelArn, token: &MetadataToken) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE channel_arn = ?1 AND token = ?2",
            params![channel.as_str(), token.as_str()],
        )?;
        Ok(affected > 0)
    }
}

const SELECT_MESSAGE: &str = "SELECT token, channel_arn, message_id, kind, body, content,
        attachment_bytes, attachment_url, file_name, audio_duration_secs,
        sender_id, sender_name, sent_at, edited_at, redacted, delivered
 FROM messages";

fn to_sql_ts(dt: &DateTime<Utc>) -> String {
    // Fixed-width millisecond form so text comparison matches time order.
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn body_columns(
    body: &MessageBody,
) -> (
    Option<&str>,
    Option<&[u8]>,
    Option<&str>,
    Option<&str>,
    Option<u32>,
) {
    match body {
        MessageBody::Text(content) => (Some(content), None, None, None, None),
        MessageBody::MeetingLink(url) => (Some(url), None, None, None, None),
        MessageBody::Image { source, file_name } | MessageBody::File { source, file_name } => {
            let (bytes, url) = split_source(source);
            (None, bytes, url, Some(file_name), None)
        }
        MessageBody::Audio {
            source,
            duration_secs,
        } => {
            let (bytes, url) = split_source(source);
            (None, bytes, url, None, Some(*duration_secs))
        }
    }
}

fn split_source(source: &AttachmentSource) -> (Option<&[u8]>, Option<&str>) {
    match source {
        AttachmentSource::Bytes(b) => (Some(b.as_slice()), None),
        AttachmentSource::Url(u) => (None, Some(u.as_str())),
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let token: String = row.get(0)?;
    let channel_arn: String = row.get(1)?;
    let message_id: Option<String> = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let body_tag: String = row.get(4)?;
    let content: Option<String> = row.get(5)?;
    let attachment_bytes: Option<Vec<u8>> = row.get(6)?;
    let attachment_url: Option<String> = row.get(7)?;
    let file_name: Option<String> = row.get(8)?;
    let duration: Option<u32> = row.get(9)?;
    let sender_id: String = row.get(10)?;
    let sender_name: String = row.get(11)?;
    let sent_str: String = row.get(12)?;
    let edited_str: Option<String> = row.get(13)?;
    let redacted: bool = row.get(14)?;
    let delivered: bool = row.get(15)?;

    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let source = match (attachment_bytes, attachment_url) {
        (Some(bytes), _) => Some(AttachmentSource::Bytes(bytes)),
        (None, Some(url)) => Some(AttachmentSource::Url(url)),
        (None, None) => None,
    };

    let body = match body_tag.as_str() {
        "text" => MessageBody::Text(content.unwrap_or_default()),
        "meeting_link" => MessageBody::MeetingLink(content.unwrap_or_default()),
        "image" | "file" | "audio" => {
            let source = source.ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Null,
                    format!("attachment row without payload: {body_tag}").into(),
                )
            })?;
            match body_tag.as_str() {
                "image" => MessageBody::Image {
                    source,
                    file_name: file_name.unwrap_or_default(),
                },
                "file" => MessageBody::File {
                    source,
                    file_name: file_name.unwrap_or_default(),
                },
                _ => MessageBody::Audio {
                    source,
                    duration_secs: duration.unwrap_or(0),
                },
            }
        }
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown body tag: {other}").into(),
            ))
        }
    };

    let sent_at = parse_sql_ts(&sent_str, 12)?;
    let edited_at = match edited_str {
        Some(s) => Some(parse_sql_ts(&s, 13)?),
        None => None,
    };

    Ok(Message {
        id: message_id.map(MessageId),
        token: MetadataToken(token),
        channel_arn: ChannelArn(channel_arn),
        kind,
        body,
        sender: Sender {
            id: UserId(sender_id),
            display_name: sender_name,
        },
        sent_at,
        edited_at,
        redacted,
        delivered,
    })
}

fn parse_sql_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use palaver_shared::types::{ChannelMode, ChannelPrivacy};

    fn seeded_db(arn: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_channel(&Channel {
            arn: ChannelArn(arn.to_string()),
            name: "general".into(),
            privacy: ChannelPrivacy::Public,
            mode: ChannelMode::Unrestricted,
            metadata: None,
            is_member: None,
            is_moderator: None,
            is_admin: None,
            created_at: Utc::now(),
        })
        .unwrap();
        db
    }

    fn text_message(channel: &str, token: &str, content: &str) -> Message {
        Message {
            id: None,
            token: MetadataToken(token.to_string()),
            channel_arn: ChannelArn(channel.to_string()),
            kind: MessageKind::Standard,
            body: MessageBody::Text(content.to_string()),
            sender: Sender {
                id: UserId("user-1".into()),
                display_name: "Nadia".into(),
            },
            sent_at: Utc::now(),
            edited_at: None,
            redacted: false,
            delivered: false,
        }
    }

    #[test]
    fn insert_and_read_back() {
        let db = seeded_db("arn:1");
        let msg = text_message("arn:1", "tok-1", "hi");
        db.insert_message(&msg).unwrap();

        let stored = db
            .get_message(&msg.channel_arn, &msg.token)
            .expect("message should exist");
        assert_eq!(stored.body.text(), Some("hi"));
        assert!(!stored.delivered);
        assert!(stored.id.is_none());
    }

    #[test]
    fn confirm_delivery_is_at_most_once() {
        let db = seeded_db("arn:1");
        let msg = text_message("arn:1", "tok-1", "hi");
        db.insert_message(&msg).unwrap();

        let id = MessageId("srv-42".into());
        assert!(db.confirm_delivery(&msg.channel_arn, &msg.token, &id).unwrap());
        // Replaying the echo updates nothing.
        assert!(!db.confirm_delivery(&msg.channel_arn, &msg.token, &id).unwrap());

        let stored = db.get_message(&msg.channel_arn, &msg.token).unwrap();
        assert_eq!(stored.id, Some(id));
        assert!(stored.delivered);
    }

    #[test]
    fn edit_does_not_touch_delivery_state() {
        let db = seeded_db("arn:1");
        let msg = text_message("arn:1", "tok-1", "hi");
        db.insert_message(&msg).unwrap();

        assert!(db
            .update_text_content(&msg.channel_arn, &msg.token, "hi (edited)", Utc::now())
            .unwrap());

        let stored = db.get_message(&msg.channel_arn, &msg.token).unwrap();
        assert_eq!(stored.body.text(), Some("hi (edited)"));
        assert!(stored.edited_at.is_some());
        assert!(!stored.delivered);
    }

    #[test]
    fn attachment_round_trip() {
        let db = seeded_db("arn:1");

        let mut msg = text_message("arn:1", "tok-img", "");
        msg.body = MessageBody::Image {
            source: AttachmentSource::Bytes(vec![0xFF, 0xD8, 0xFF]),
            file_name: "photo.jpg".into(),
        };
        db.insert_message(&msg).unwrap();

        let mut audio = text_message("arn:1", "tok-audio", "");
        audio.body = MessageBody::Audio {
            source: AttachmentSource::Url("https://cdn.example/voice.m4a".into()),
            duration_secs: 12,
        };
        db.insert_message(&audio).unwrap();

        let stored = db.get_message(&msg.channel_arn, &msg.token).unwrap();
        assert_eq!(
            stored.body,
            MessageBody::Image {
                source: AttachmentSource::Bytes(vec![0xFF, 0xD8, 0xFF]),
                file_name: "photo.jpg".into(),
            }
        );

        let stored_audio = db.get_message(&audio.channel_arn, &audio.token).unwrap();
        assert_eq!(
            stored_audio.body,
            MessageBody::Audio {
                source: AttachmentSource::Url("https://cdn.example/voice.m4a".into()),
                duration_secs: 12,
            }
        );
    }

    #[test]
    fn channel_ordering_is_sent_at_then_insertion() {
        let db = seeded_db("arn:1");
        let base = Utc::now();

        let mut early = text_message("arn:1", "tok-b", "second by insertion");
        early.sent_at = base;
        let mut later = text_message("arn:1", "tok-c", "latest");
        later.sent_at = base + chrono::Duration::milliseconds(5);
        let mut tie = text_message("arn:1", "tok-a", "first by insertion");
        tie.sent_at = base;

        db.insert_message(&early).unwrap();
        db.insert_message(&tie).unwrap();
        db.insert_message(&later).unwrap();

        let order: Vec<String> = db
            .get_messages_for_channel(&ChannelArn("arn:1".into()))
            .unwrap()
            .into_iter()
            .map(|m| m.token.0)
            .collect();
        assert_eq!(order, vec!["tok-b", "tok-a", "tok-c"]);
    }

    #[test]
    fn deleting_channel_cascades_to_messages() {
        let db = seeded_db("arn:1");
        let msg = text_message("arn:1", "tok-1", "hi");
        db.insert_message(&msg).unwrap();

        db.delete_channel(&ChannelArn("arn:1".into())).unwrap();
        assert!(matches!(
            db.get_message(&msg.channel_arn, &msg.token),
            Err(StoreError::NotFound)
        ));
    }
}
