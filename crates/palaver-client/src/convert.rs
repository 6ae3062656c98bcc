//! Conversions from wire shapes into domain models.
//!
//! The message kind is decided here, once, from what the wire actually
//! carries -- downstream code matches on [`MessageBody`] instead of probing
//! optional fields.

use chrono::Utc;

use palaver_net::{RemoteChannel, RemoteMessage};
use palaver_shared::protocol::RelayPayload;
use palaver_shared::types::{
    from_epoch_millis, parse_epoch_millis, ChannelArn, ChannelMode, ChannelPrivacy, MessageId,
    MetadataToken, UserId,
};
use palaver_shared::ProtocolError;
use palaver_store::{AttachmentSource, Channel, Message, MessageBody, MessageKind, Sender};

use crate::error::{ClientError, Result};

pub fn channel_from_remote(remote: RemoteChannel) -> Channel {
    Channel {
        arn: ChannelArn(remote.channel_arn),
        name: remote.name,
        privacy: remote
            .privacy
            .as_deref()
            .and_then(ChannelPrivacy::parse)
            .unwrap_or(ChannelPrivacy::Public),
        mode: remote
            .mode
            .as_deref()
            .and_then(ChannelMode::parse)
            .unwrap_or(ChannelMode::Unrestricted),
        metadata: remote.metadata,
        is_member: remote.is_member,
        is_moderator: remote.is_moderator,
        is_admin: remote.is_admin,
        // First-seen timestamp; the store preserves the original on re-import.
        created_at: Utc::now(),
    }
}

/// Classify an attachment by its MIME type.
fn attachment_body(
    url: String,
    file_name: Option<String>,
    file_type: Option<&str>,
    duration_secs: Option<u32>,
) -> MessageBody {
    let source = AttachmentSource::Url(url);
    let file_name = file_name.unwrap_or_default();
    match file_type {
        Some(t) if t.starts_with("image/") => MessageBody::Image { source, file_name },
        Some(t) if t.starts_with("audio/") => MessageBody::Audio {
            source,
            duration_secs: duration_secs.unwrap_or(0),
        },
        _ => MessageBody::File { source, file_name },
    }
}

/// Build a domain message from a polled API message.
///
/// Anything the server returns is by definition acknowledged, so the result
/// is always `delivered`. Messages from other clients may carry no metadata
/// token; the server id stands in as the correlation key for those.
pub fn message_from_remote(remote: RemoteMessage) -> Result<Message> {
    let token = match remote.metadata {
        Some(ref m) if !m.is_empty() => MetadataToken(m.clone()),
        _ => MetadataToken(remote.message_id.clone()),
    };

    let sent_at = from_epoch_millis(remote.created_timestamp).ok_or_else(|| {
        ClientError::InvalidInput(format!(
            "message {} has invalid timestamp {}",
            remote.message_id, remote.created_timestamp
        ))
    })?;
    let edited_at = remote
        .last_edited_timestamp
        .and_then(from_epoch_millis);

    let body = match remote.attachment {
        Some(att) => attachment_body(
            att.url,
            att.file_name,
            att.file_type.as_deref(),
            att.duration_secs,
        ),
        None => MessageBody::Text(remote.content.unwrap_or_default()),
    };

    Ok(Message {
        id: Some(MessageId(remote.message_id)),
        token,
        channel_arn: ChannelArn(remote.channel_arn),
        kind: remote
            .kind
            .as_deref()
            .and_then(MessageKind::parse)
            .unwrap_or(MessageKind::Standard),
        body,
        sender: Sender {
            id: UserId(remote.sender_id),
            display_name: remote.sender_name,
        },
        sent_at,
        edited_at,
        redacted: remote.redacted.unwrap_or(false),
        delivered: true,
    })
}

/// Build a domain message from a live relay payload.
pub fn message_from_relay(payload: &RelayPayload) -> std::result::Result<Message, ProtocolError> {
    let channel_arn = payload
        .channel_arn
        .clone()
        .ok_or(ProtocolError::MissingField("ChannelArn"))?;

    let token = payload
        .metadata_token()
        .or_else(|| payload.message_id.clone().map(MetadataToken))
        .ok_or(ProtocolError::MissingField("Metadata"))?;

    let created = payload
        .created_timestamp
        .as_deref()
        .ok_or(ProtocolError::MissingField("CreatedTimestamp"))?;
    let sent_at =
        parse_epoch_millis(created).ok_or_else(|| ProtocolError::Timestamp(created.to_string()))?;
    let edited_at = payload
        .last_edited_timestamp
        .as_deref()
        .and_then(parse_epoch_millis);

    let body = match payload.attachment_meta() {
        Some(meta) => match meta.url {
            Some(url) => attachment_body(url, meta.file_name, meta.file_type.as_deref(), None),
            None => MessageBody::Text(payload.content.clone().unwrap_or_default()),
        },
        None => MessageBody::Text(payload.content.clone().unwrap_or_default()),
    };

    Ok(Message {
        id: payload.message_id.clone().map(MessageId),
        token,
        channel_arn: ChannelArn(channel_arn),
        kind: MessageKind::Standard,
        body,
        sender: Sender {
            id: UserId(payload.sender_arn.clone().unwrap_or_default()),
            display_name: payload.sender_name.clone().unwrap_or_default(),
        },
        sent_at,
        edited_at,
        redacted: payload.redacted.unwrap_or(false),
        delivered: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_shared::protocol::RelayEnvelope;
    use palaver_shared::types::to_epoch_millis;

    #[test]
    fn relay_text_payload_becomes_delivered_text_message() {
        let env = RelayEnvelope::from_json(
            r#"{
                "Headers": { "MessageType": "CHANNEL_MESSAGE" },
                "Payload": {
                    "ChannelArn": "arn:1",
                    "MessageId": "srv-1",
                    "Content": "hi",
                    "SenderArn": "user-7",
                    "SenderName": "Nadia",
                    "CreatedTimestamp": "1700000000123",
                    "Metadata": "tok-1"
                }
            }"#,
        )
        .unwrap();

        let message = message_from_relay(&env.payload.unwrap()).unwrap();
        assert_eq!(message.token, MetadataToken("tok-1".into()));
        assert_eq!(message.id, Some(MessageId("srv-1".into())));
        assert_eq!(message.body, MessageBody::Text("hi".into()));
        assert_eq!(to_epoch_millis(&message.sent_at), 1_700_000_000_123);
        assert!(message.delivered);
    }

    #[test]
    fn relay_payload_without_channel_is_rejected() {
        let env = RelayEnvelope::from_json(
            r#"{ "Headers": { "MessageType": "CHANNEL_MESSAGE" },
                 "Payload": { "Content": "hi", "CreatedTimestamp": "1" } }"#,
        )
        .unwrap();

        let err = message_from_relay(&env.payload.unwrap()).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("ChannelArn")));
    }

    #[test]
    fn attachment_kind_follows_mime_type() {
        let image = attachment_body(
            "https://cdn.example/a.png".into(),
            Some("a.png".into()),
            Some("image/png"),
            None,
        );
        assert!(matches!(image, MessageBody::Image { .. }));

        let audio = attachment_body(
            "https://cdn.example/v.m4a".into(),
            None,
            Some("audio/mp4"),
            Some(12),
        );
        assert_eq!(
            audio,
            MessageBody::Audio {
                source: AttachmentSource::Url("https://cdn.example/v.m4a".into()),
                duration_secs: 12,
            }
        );

        let fallback = attachment_body("https://cdn.example/doc".into(), None, None, None);
        assert!(matches!(fallback, MessageBody::File { .. }));
    }

    #[test]
    fn remote_message_without_metadata_falls_back_to_server_id() {
        let remote = RemoteMessage {
            message_id: "srv-9".into(),
            channel_arn: "arn:1".into(),
            content: Some("hello".into()),
            metadata: None,
            kind: Some("system".into()),
            sender_id: "user-2".into(),
            sender_name: "Omar".into(),
            created_timestamp: 1_700_000_000_000,
            last_edited_timestamp: None,
            redacted: None,
            attachment: None,
        };

        let message = message_from_remote(remote).unwrap();
        assert_eq!(message.token, MetadataToken("srv-9".into()));
        assert_eq!(message.kind, MessageKind::System);
        assert!(message.delivered);
    }
}
