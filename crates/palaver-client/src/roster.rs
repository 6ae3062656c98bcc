//! In-memory channel roster.
//!
//! Maintains the channels the client knows about, each with its ordered
//! message collection and its transient new-since-last-viewed bucket. The
//! roster is pure bookkeeping: persistence is the reconciler's job, and all
//! mutation happens under the client state lock.

use std::collections::HashMap;

use palaver_shared::types::{ChannelArn, MessageId, MetadataToken};
use palaver_store::{Channel, Message};

/// One channel plus its in-memory message state.
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    pub channel: Channel,
    /// Messages ordered by send time ascending, insertion order on ties.
    pub messages: Vec<Message>,
    /// Live messages that arrived while the channel was not focused.
    pub new_messages: Vec<Message>,
}

impl ChannelEntry {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            messages: Vec::new(),
            new_messages: Vec::new(),
        }
    }
}

/// Tracks all locally known channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelRoster {
    channels: HashMap<ChannelArn, ChannelEntry>,
}

impl ChannelRoster {
    /// Create a new, empty roster.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Insert a channel, or refresh an existing entry in place.
    ///
    /// Membership flags only overwrite the stored value when the incoming
    /// channel carries one, and the first-seen timestamp is preserved --
    /// matching the store's upsert semantics. Existing messages are kept.
    pub fn upsert_channel(&mut self, incoming: Channel) {
        match self.channels.get_mut(&incoming.arn) {
            Some(entry) => {
                let existing = &mut entry.channel;
                existing.name = incoming.name;
                existing.privacy = incoming.privacy;
                existing.mode = incoming.mode;
                if incoming.metadata.is_some() {
                    existing.metadata = incoming.metadata;
                }
                if incoming.is_member.is_some() {
                    existing.is_member = incoming.is_member;
                }
                if incoming.is_moderator.is_some() {
                    existing.is_moderator = incoming.is_moderator;
                }
                if incoming.is_admin.is_some() {
                    existing.is_admin = incoming.is_admin;
                }
            }
            None => {
                self.channels
                    .insert(incoming.arn.clone(), ChannelEntry::new(incoming));
            }
        }
    }

    /// Remove a channel and all of its in-memory messages.
    pub fn remove_channel(&mut self, arn: &ChannelArn) -> bool {
        self.channels.remove(arn).is_some()
    }

    pub fn contains(&self, arn: &ChannelArn) -> bool {
        self.channels.contains_key(arn)
    }

    pub fn entry(&self, arn: &ChannelArn) -> Option<&ChannelEntry> {
        self.channels.get(arn)
    }

    /// Snapshot of all channels, newest first (ARN breaks ties so the
    /// listing is deterministic).
    pub fn channels(&self) -> Vec<Channel> {
        let mut list: Vec<Channel> = self
            .channels
            .values()
            .map(|entry| entry.channel.clone())
            .collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.arn.as_str().cmp(b.arn.as_str()))
        });
        list
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn find_message(&self, arn: &ChannelArn, token: &MetadataToken) -> Option<&Message> {
        self.channels
            .get(arn)?
            .messages
            .iter()
            .find(|m| &m.token == token)
    }

    /// Append a message to a channel.  Returns `false` when the channel is
    /// unknown.
    pub fn insert_message(&mut self, message: Message) -> bool {
        match self.channels.get_mut(&message.channel_arn) {
            Some(entry) => {
                entry.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Record a delivery confirmation: assign the canonical id and flip
    /// `delivered`, touching nothing else. Returns `false` when the message
    /// is unknown or already delivered.
    pub fn confirm_message(
        &mut self,
        arn: &ChannelArn,
        token: &MetadataToken,
        message_id: &MessageId,
    ) -> bool {
        let Some(entry) = self.channels.get_mut(arn) else {
            return false;
        };
        let Some(message) = entry.messages.iter_mut().find(|m| &m.token == token) else {
            return false;
        };
        if message.delivered {
            return false;
        }
        message.id = Some(message_id.clone());
        message.delivered = true;
        true
    }

    /// Replace the text content of a message after an edit.
    pub fn update_text(
        &mut self,
        arn: &ChannelArn,
        token: &MetadataToken,
        content: &str,
        edited_at: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let Some(entry) = self.channels.get_mut(arn) else {
            return false;
        };
        let Some(message) = entry.messages.iter_mut().find(|m| &m.token == token) else {
            return false;
        };
        match &mut message.body {
            palaver_store::MessageBody::Text(text) => {
                *text = content.to_string();
                message.edited_at = Some(edited_at);
                true
            }
            _ => false,
        }
    }

    /// Remove a message.  Returns `true` if it existed.
    pub fn remove_message(&mut self, arn: &ChannelArn, token: &MetadataToken) -> bool {
        let Some(entry) = self.channels.get_mut(arn) else {
            return false;
        };
        let before = entry.messages.len();
        entry.messages.retain(|m| &m.token != token);
        entry.messages.len() != before
    }

    /// Re-establish message order for a channel: send time ascending, ties
    /// keep their current relative (insertion) order. `sort_by` is stable,
    /// so repeated sorting of the same set is a no-op.
    pub fn sort_channel(&mut self, arn: &ChannelArn) {
        if let Some(entry) = self.channels.get_mut(arn) {
            entry.messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        }
    }

    pub fn messages(&self, arn: &ChannelArn) -> Option<&[Message]> {
        self.channels.get(arn).map(|entry| entry.messages.as_slice())
    }

    // ------------------------------------------------------------------
    // New-since-last-viewed bucket
    // ------------------------------------------------------------------

    /// Add a live message to the channel's new bucket.  Duplicate tokens are
    /// ignored.  Returns the bucket size afterwards.
    pub fn push_new(&mut self, arn: &ChannelArn, message: Message) -> usize {
        let Some(entry) = self.channels.get_mut(arn) else {
            return 0;
        };
        if !entry.new_messages.iter().any(|m| m.token == message.token) {
            entry.new_messages.push(message);
        }
        entry.new_messages.len()
    }

    /// Empty the new bucket; called when the channel's view gains focus.
    pub fn clear_new(&mut self, arn: &ChannelArn) {
        if let Some(entry) = self.channels.get_mut(arn) {
            entry.new_messages.clear();
        }
    }

    pub fn new_count(&self, arn: &ChannelArn) -> usize {
        self.channels
            .get(arn)
            .map(|entry| entry.new_messages.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use palaver_shared::types::{ChannelMode, ChannelPrivacy, UserId};
    use palaver_store::{MessageBody, MessageKind, Sender};

    fn test_channel(arn: &str) -> Channel {
        Channel {
            arn: ChannelArn(arn.to_string()),
            name: "general".into(),
            privacy: ChannelPrivacy::Public,
            mode: ChannelMode::Unrestricted,
            metadata: None,
            is_member: None,
            is_moderator: None,
            is_admin: None,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        }
    }

    fn test_message(arn: &str, token: &str, at_ms: i64) -> Message {
        Message {
            id: None,
            token: MetadataToken(token.to_string()),
            channel_arn: ChannelArn(arn.to_string()),
            kind: MessageKind::Standard,
            body: MessageBody::Text(format!("msg {token}")),
            sender: Sender {
                id: UserId("user-1".into()),
                display_name: "Nadia".into(),
            },
            sent_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
            edited_at: None,
            redacted: false,
            delivered: false,
        }
    }

    #[test]
    fn test_upsert_keeps_messages_and_flags() {
        let mut roster = ChannelRoster::new();
        let arn = ChannelArn("arn:1".into());

        let mut channel = test_channel("arn:1");
        channel.is_member = Some(true);
        roster.upsert_channel(channel);
        roster.insert_message(test_message("arn:1", "tok-1", 1));

        // Re-import with unknown flags and a new name.
        let mut refetched = test_channel("arn:1");
        refetched.name = "general-2".into();
        roster.upsert_channel(refetched);

        assert_eq!(roster.channel_count(), 1);
        let entry = roster.entry(&arn).unwrap();
        assert_eq!(entry.channel.name, "general-2");
        assert_eq!(entry.channel.is_member, Some(true));
        assert_eq!(entry.messages.len(), 1);
    }

    #[test]
    fn test_confirm_is_one_shot() {
        let mut roster = ChannelRoster::new();
        let arn = ChannelArn("arn:1".into());
        roster.upsert_channel(test_channel("arn:1"));
        roster.insert_message(test_message("arn:1", "tok-1", 1));

        let id = MessageId("srv-1".into());
        assert!(roster.confirm_message(&arn, &MetadataToken("tok-1".into()), &id));
        assert!(!roster.confirm_message(&arn, &MetadataToken("tok-1".into()), &id));

        let message = roster
            .find_message(&arn, &MetadataToken("tok-1".into()))
            .unwrap();
        assert_eq!(message.id, Some(id));
        assert!(message.delivered);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut roster = ChannelRoster::new();
        let arn = ChannelArn("arn:1".into());
        roster.upsert_channel(test_channel("arn:1"));

        roster.insert_message(test_message("arn:1", "tok-b", 100));
        roster.insert_message(test_message("arn:1", "tok-a", 100));
        roster.insert_message(test_message("arn:1", "tok-c", 50));
        roster.sort_channel(&arn);
        roster.sort_channel(&arn);

        let order: Vec<&str> = roster
            .messages(&arn)
            .unwrap()
            .iter()
            .map(|m| m.token.as_str())
            .collect();
        assert_eq!(order, vec!["tok-c", "tok-b", "tok-a"]);
    }

    #[test]
    fn test_new_bucket_dedups_and_clears() {
        let mut roster = ChannelRoster::new();
        let arn = ChannelArn("arn:1".into());
        roster.upsert_channel(test_channel("arn:1"));

        assert_eq!(roster.push_new(&arn, test_message("arn:1", "tok-1", 1)), 1);
        assert_eq!(roster.push_new(&arn, test_message("arn:1", "tok-2", 2)), 2);
        assert_eq!(roster.push_new(&arn, test_message("arn:1", "tok-1", 1)), 2);

        roster.clear_new(&arn);
        assert_eq!(roster.new_count(&arn), 0);
    }

    #[test]
    fn test_unknown_channel_is_ignored() {
        let mut roster = ChannelRoster::new();
        let arn = ChannelArn("arn:absent".into());

        assert!(!roster.insert_message(test_message("arn:absent", "tok-1", 1)));
        assert_eq!(roster.push_new(&arn, test_message("arn:absent", "tok-1", 1)), 0);
        assert_eq!(roster.new_count(&arn), 0);
        assert!(!roster.remove_channel(&arn));
    }
}
