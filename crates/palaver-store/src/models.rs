//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palaver_shared::types::{
    ChannelArn, ChannelMode, ChannelPrivacy, MessageId, MetadataToken, Presence, UserId,
};

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A conversation channel (direct or group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Server-assigned ARN, globally unique.
    pub arn: ChannelArn,
    /// Human-readable channel name.
    pub name: String,
    pub privacy: ChannelPrivacy,
    pub mode: ChannelMode,
    /// Optional free-text description.
    pub metadata: Option<String>,
    /// `None` means the membership record has not been fetched yet.
    pub is_member: Option<bool>,
    pub is_moderator: Option<bool>,
    pub is_admin: Option<bool>,
    /// When the channel was first seen locally.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Sender identity attached to every message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub display_name: String,
}

/// Coarse message classification as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Standard,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Where an attachment payload lives: raw bytes captured locally, or a
/// remote URL handed out by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachmentSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// Message content, decided once at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Image {
        source: AttachmentSource,
        file_name: String,
    },
    File {
        source: AttachmentSource,
        file_name: String,
    },
    Audio {
        source: AttachmentSource,
        duration_secs: u32,
    },
    MeetingLink(String),
}

impl MessageBody {
    /// Column discriminator used by the store.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
            Self::Audio { .. } => "audio",
            Self::MeetingLink(_) => "meeting_link",
        }
    }

    /// The text content, for bodies that have one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(content) => Some(content),
            Self::MeetingLink(url) => Some(url),
            _ => None,
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Canonical server id. `None` until the server echoes the message back.
    pub id: Option<MessageId>,
    /// Client correlation token, unique within the channel.
    pub token: MetadataToken,
    /// The channel this message belongs to.
    pub channel_arn: ChannelArn,
    pub kind: MessageKind,
    pub body: MessageBody,
    pub sender: Sender,
    /// When the message was sent (millisecond precision).
    pub sent_at: DateTime<Utc>,
    /// When the message was last edited, if ever.
    pub edited_at: Option<DateTime<Utc>>,
    /// Whether the message was redacted by a moderator.
    pub redacted: bool,
    /// Whether the server has acknowledged this message.
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A known contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub user_id: UserId,
    pub display_name: String,
    /// Presence as last reported by the server.
    pub presence: Presence,
    /// When this contact was first seen locally.
    pub created_at: DateTime<Utc>,
}
