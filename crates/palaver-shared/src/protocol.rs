//! Relay wire format.
//!
//! The live relay delivers one JSON envelope per event: a `Headers` object
//! carrying the event/message type discriminators and a `Payload` object
//! carrying the message fields. Timestamps arrive as numeric strings, and
//! the `Metadata` field is itself a string — either a bare client token or
//! an embedded JSON object describing an attachment.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::MetadataToken;

/// Header discriminator for chat message events.
pub const EVENT_CHANNEL_MESSAGE: &str = "CHANNEL_MESSAGE";
/// Header discriminator sent once after the signed-URL handshake completes.
pub const EVENT_SESSION_ESTABLISHED: &str = "SESSION_ESTABLISHED";

/// One relay event as it appears on the socket.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayEnvelope {
    #[serde(rename = "Headers")]
    pub headers: RelayHeaders,
    #[serde(rename = "Payload")]
    pub payload: Option<RelayPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayHeaders {
    #[serde(rename = "EventType")]
    pub event_type: Option<String>,
    #[serde(rename = "MessageType")]
    pub message_type: Option<String>,
}

/// Message fields carried inside a `CHANNEL_MESSAGE` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayPayload {
    #[serde(rename = "ChannelArn")]
    pub channel_arn: Option<String>,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
    #[serde(rename = "Content")]
    pub content: Option<String>,
    #[serde(rename = "SenderArn")]
    pub sender_arn: Option<String>,
    #[serde(rename = "SenderName")]
    pub sender_name: Option<String>,
    /// Epoch milliseconds as a numeric string.
    #[serde(rename = "CreatedTimestamp")]
    pub created_timestamp: Option<String>,
    /// Epoch milliseconds as a numeric string; absent when never edited.
    #[serde(rename = "LastEditedTimestamp")]
    pub last_edited_timestamp: Option<String>,
    /// Bare client token, or an embedded JSON [`AttachmentMeta`] object.
    #[serde(rename = "Metadata")]
    pub metadata: Option<String>,
    #[serde(rename = "Redacted")]
    pub redacted: Option<bool>,
}

/// Attachment descriptor round-tripped through the payload `Metadata`
/// string. For attachments the client token travels in `messageId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentMeta {
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "fileType", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AttachmentMeta {
    /// Serialize back into the wire's embedded-string form.
    pub fn to_metadata_string(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Coarse classification of an inbound relay event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEventKind {
    /// A chat message for some channel.
    Message,
    /// The handshake acknowledgement.
    SessionEstablished,
    /// Anything we do not consume.
    Other,
}

impl RelayEnvelope {
    /// Decode an envelope from one socket frame.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> RelayEventKind {
        let is = |header: &Option<String>, tag: &str| header.as_deref() == Some(tag);
        let headers = &self.headers;
        if is(&headers.event_type, EVENT_CHANNEL_MESSAGE)
            || is(&headers.message_type, EVENT_CHANNEL_MESSAGE)
        {
            RelayEventKind::Message
        } else if is(&headers.event_type, EVENT_SESSION_ESTABLISHED)
            || is(&headers.message_type, EVENT_SESSION_ESTABLISHED)
        {
            RelayEventKind::SessionEstablished
        } else {
            RelayEventKind::Other
        }
    }
}

impl RelayPayload {
    /// Attachment descriptor, when `Metadata` holds an embedded JSON object.
    pub fn attachment_meta(&self) -> Option<AttachmentMeta> {
        let raw = self.metadata.as_deref()?;
        serde_json::from_str(raw).ok()
    }

    /// The client correlation token for this message.
    ///
    /// Text messages carry the bare token in `Metadata`; attachments embed
    /// it as the `messageId` field of the attachment JSON.
    pub fn metadata_token(&self) -> Option<MetadataToken> {
        let raw = self.metadata.as_deref()?;
        if raw.is_empty() {
            return None;
        }
        if let Some(meta) = self.attachment_meta() {
            return meta.message_id.map(MetadataToken);
        }
        Some(MetadataToken(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_envelope() {
        let raw = r#"{
            "Headers": { "EventType": "CHANNEL_MESSAGE", "MessageType": "STANDARD" },
            "Payload": {
                "ChannelArn": "arn:chat:app/channel/c1",
                "MessageId": "srv-42",
                "Content": "hello",
                "SenderArn": "user-7",
                "SenderName": "Nadia",
                "CreatedTimestamp": "1700000000123",
                "Metadata": "tok-1"
            }
        }"#;

        let env = RelayEnvelope::from_json(raw).unwrap();
        assert_eq!(env.kind(), RelayEventKind::Message);

        let payload = env.payload.unwrap();
        assert_eq!(payload.channel_arn.as_deref(), Some("arn:chat:app/channel/c1"));
        assert_eq!(payload.message_id.as_deref(), Some("srv-42"));
        assert_eq!(
            payload.metadata_token(),
            Some(MetadataToken("tok-1".into()))
        );
        assert!(payload.attachment_meta().is_none());
    }

    #[test]
    fn test_event_kind_discrimination() {
        let msg = RelayEnvelope::from_json(
            r#"{ "Headers": { "MessageType": "CHANNEL_MESSAGE" } }"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), RelayEventKind::Message);

        let hello = RelayEnvelope::from_json(
            r#"{ "Headers": { "EventType": "SESSION_ESTABLISHED" } }"#,
        )
        .unwrap();
        assert_eq!(hello.kind(), RelayEventKind::SessionEstablished);

        let other = RelayEnvelope::from_json(r#"{ "Headers": { "EventType": "PING" } }"#).unwrap();
        assert_eq!(other.kind(), RelayEventKind::Other);
    }

    #[test]
    fn test_attachment_metadata_string() {
        let raw = r#"{
            "Headers": { "MessageType": "CHANNEL_MESSAGE" },
            "Payload": {
                "ChannelArn": "arn:chat:app/channel/c1",
                "MessageId": "srv-9",
                "CreatedTimestamp": "1700000005000",
                "Metadata": "{\"fileName\":\"report.pdf\",\"fileType\":\"application/pdf\",\"messageId\":\"tok-9\",\"url\":\"https://cdn.example/report.pdf\"}"
            }
        }"#;

        let env = RelayEnvelope::from_json(raw).unwrap();
        let payload = env.payload.unwrap();

        let meta = payload.attachment_meta().unwrap();
        assert_eq!(meta.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(meta.url.as_deref(), Some("https://cdn.example/report.pdf"));

        // Correlation token comes from the embedded object, not the raw string.
        assert_eq!(payload.metadata_token(), Some(MetadataToken("tok-9".into())));

        // And it round-trips back into the embedded-string form.
        let restored: AttachmentMeta =
            serde_json::from_str(&meta.to_metadata_string().unwrap()).unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn test_empty_metadata_has_no_token() {
        let env = RelayEnvelope::from_json(
            r#"{ "Headers": { "MessageType": "CHANNEL_MESSAGE" },
                 "Payload": { "Metadata": "" } }"#,
        )
        .unwrap();
        assert_eq!(env.payload.unwrap().metadata_token(), None);
    }
}
