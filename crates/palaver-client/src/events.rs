//! Events emitted toward the presentation layer.
//!
//! A UI subscribes with [`PalaverClient::subscribe_events`] and re-renders on
//! receipt; the broadcast channel drops nothing while at least one receiver
//! keeps up.

use tokio::sync::broadcast;

use palaver_shared::types::{ChannelArn, MessageId, MetadataToken, Presence, UserId};

/// One observable state change.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A message from another user arrived (poll or relay).
    NewMessage {
        channel_arn: ChannelArn,
        token: MetadataToken,
        sender: UserId,
    },
    /// A locally-sent message was acknowledged by the server.
    MessageDelivered {
        channel_arn: ChannelArn,
        token: MetadataToken,
        message_id: MessageId,
    },
    /// A channel's unread count changed.
    UnreadChanged {
        channel_arn: ChannelArn,
        count: usize,
    },
    /// The relay connected or disconnected.
    RelayStateChanged { connected: bool },
    /// A contact's presence changed.
    PresenceChanged { user_id: UserId, presence: Presence },
}

pub fn emit_event(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    // send only fails when no receiver is subscribed, which is fine.
    if tx.send(event).is_err() {
        tracing::trace!("No event subscribers");
    }
}
