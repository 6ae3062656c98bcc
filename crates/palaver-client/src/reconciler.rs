//! Message/channel reconciler.
//!
//! Merges remote channel and message state into the local database and the
//! in-memory roster without creating duplicates. The correlation key for a
//! message is its client metadata token, never the server id -- a
//! locally-created message has no server id until the server echoes it back.
//!
//! The reconciler is the only code that can flip a message to `delivered`,
//! and both ingestion paths (poll batches and single relay events) go
//! through [`Reconciler::merge_single`], so "I polled and saw my message"
//! and "the server pushed my message back" cannot diverge.
//!
//! The in-memory update and the store write are two separate, non-atomic
//! steps; all calls must happen under the client state lock.

use tracing::debug;

use palaver_shared::types::{ChannelArn, MessageId, MetadataToken};
use palaver_store::{Channel, Database, Message};

use crate::error::{ClientError, Result};
use crate::roster::ChannelRoster;

/// What [`Reconciler::merge_single`] did with an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was not known locally and was inserted.
    Inserted,
    /// A locally-created copy existed; it was assigned its canonical id and
    /// marked delivered.
    Confirmed(MessageId),
    /// The message was already known and delivered; nothing changed.
    Unchanged,
}

/// Reconciler over the local database and the in-memory channel roster.
///
/// Constructed explicitly with its database handle; tests run it against an
/// in-memory store.
pub struct Reconciler {
    db: Database,
    roster: ChannelRoster,
}

impl Reconciler {
    /// Create a reconciler, hydrating the roster from whatever the store
    /// already holds so the client is usable before any network round-trip.
    pub fn new(db: Database) -> Result<Self> {
        let mut roster = ChannelRoster::new();

        for channel in db.list_channels()? {
            let arn = channel.arn.clone();
            roster.upsert_channel(channel);
            for message in db.get_messages_for_channel(&arn)? {
                roster.insert_message(message);
            }
        }

        debug!(channels = roster.channel_count(), "roster hydrated");
        Ok(Self { db, roster })
    }

    pub fn roster(&self) -> &ChannelRoster {
        &self.roster
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Upsert every remotely listed channel by ARN and return the merged
    /// channel list. Channels that exist locally but are absent remotely are
    /// left untouched -- deletion only ever happens through an explicit
    /// leave.
    pub fn reconcile_channel_list(&mut self, remote: Vec<Channel>) -> Result<Vec<Channel>> {
        for channel in remote {
            self.roster.upsert_channel(channel.clone());
            self.db.upsert_channel(&channel)?;
        }
        Ok(self.roster.channels())
    }

    /// Drop a channel and its messages after a successful remote leave.
    pub fn remove_channel(&mut self, arn: &ChannelArn) -> Result<bool> {
        let removed = self.roster.remove_channel(arn);
        self.db.delete_channel(arn)?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Merge one server-acknowledged message, by correlation token, into
    /// the target channel.
    ///
    /// - Unknown token: insert, with `delivered` as the server reported it.
    /// - Known token, not yet delivered: assign the canonical id and flip
    ///   `delivered` -- nothing else. Content edited locally between send
    ///   and echo survives.
    /// - Known token, already delivered: no-op.
    pub fn merge_single(&mut self, message: Message) -> Result<MergeOutcome> {
        let arn = message.channel_arn.clone();
        if !self.roster.contains(&arn) {
            return Err(ClientError::UnknownChannel(arn.0));
        }

        match self.roster.find_message(&arn, &message.token) {
            None => {
                self.roster.insert_message(message.clone());
                self.roster.sort_channel(&arn);
                self.db.insert_message(&message)?;
                Ok(MergeOutcome::Inserted)
            }
            Some(existing) if existing.delivered => Ok(MergeOutcome::Unchanged),
            Some(_) => match message.id {
                Some(id) => {
                    self.roster.confirm_message(&arn, &message.token, &id);
                    self.db.confirm_delivery(&arn, &message.token, &id)?;
                    Ok(MergeOutcome::Confirmed(id))
                }
                // An echo without a server id cannot confirm anything.
                None => Ok(MergeOutcome::Unchanged),
            },
        }
    }

    /// Merge a polled batch of remote messages for a channel and return the
    /// merged, time-ordered result. Re-merging the same batch is a no-op.
    pub fn merge_remote_messages(
        &mut self,
        arn: &ChannelArn,
        remote: Vec<Message>,
    ) -> Result<Vec<Message>> {
        if !self.roster.contains(arn) {
            return Err(ClientError::UnknownChannel(arn.0.clone()));
        }

        for message in remote {
            if &message.channel_arn != arn {
                return Err(ClientError::InvalidInput(format!(
                    "message {} targets channel {}, not {}",
                    message.token, message.channel_arn, arn
                )));
            }
            self.merge_single(message)?;
        }

        Ok(self.messages(arn))
    }

    /// Optimistic send: append to the in-memory channel first, so a UI
    /// reflects the message before the network confirms, then persist. The
    /// caller issues the network send afterwards; if that fails the message
    /// simply stays with `delivered = false`.
    pub fn append_local_message(&mut self, message: Message) -> Result<()> {
        let arn = message.channel_arn.clone();
        if !self.roster.contains(&arn) {
            return Err(ClientError::UnknownChannel(arn.0));
        }

        self.roster.insert_message(message.clone());
        self.roster.sort_channel(&arn);
        self.db.insert_message(&message)?;
        Ok(())
    }

    /// Record a live message in the channel's unread bucket. Returns the
    /// bucket size. The caller decides whether the channel is focused.
    pub fn mark_new_message(&mut self, arn: &ChannelArn, message: Message) -> usize {
        self.roster.push_new(arn, message)
    }

    /// Reset the unread bucket; called when the channel view gains focus.
    pub fn clear_new_messages(&mut self, arn: &ChannelArn) {
        self.roster.clear_new(arn);
    }

    /// Apply a text edit locally (memory + store). The merge path never
    /// overwrites content, so an edit made between send and echo sticks.
    pub fn edit_text(
        &mut self,
        arn: &ChannelArn,
        token: &MetadataToken,
        content: &str,
    ) -> Result<()> {
        let edited_at = chrono::Utc::now();
        if !self.roster.update_text(arn, token, content, edited_at) {
            return Err(ClientError::InvalidInput(format!(
                "no editable text message {token} in {arn}"
            )));
        }
        self.db.update_text_content(arn, token, content, edited_at)?;
        Ok(())
    }

    /// Remove a message after a successful remote delete.
    pub fn delete_message(&mut self, arn: &ChannelArn, token: &MetadataToken) -> Result<bool> {
        let removed = self.roster.remove_message(arn, token);
        self.db.delete_message(arn, token)?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn channels(&self) -> Vec<Channel> {
        self.roster.channels()
    }

    pub fn messages(&self, arn: &ChannelArn) -> Vec<Message> {
        self.roster
            .messages(arn)
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }

    pub fn unread_count(&self, arn: &ChannelArn) -> usize {
        self.roster.new_count(arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use palaver_shared::protocol::RelayEnvelope;
    use palaver_shared::types::{ChannelMode, ChannelPrivacy, UserId};
    use palaver_store::{MessageBody, MessageKind, Sender};

    use crate::convert::message_from_relay;

    fn reconciler() -> Reconciler {
        Reconciler::new(Database::open_in_memory().unwrap()).unwrap()
    }

    fn channel(arn: &str, name: &str) -> Channel {
        Channel {
            arn: ChannelArn(arn.to_string()),
            name: name.to_string(),
            privacy: ChannelPrivacy::Public,
            mode: ChannelMode::Unrestricted,
            metadata: None,
            is_member: Some(true),
            is_moderator: None,
            is_admin: None,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        }
    }

    fn local_message(arn: &str, token: &str, content: &str, at_ms: i64) -> Message {
        Message {
            id: None,
            token: MetadataToken(token.to_string()),
            channel_arn: ChannelArn(arn.to_string()),
            kind: MessageKind::Standard,
            body: MessageBody::Text(content.to_string()),
            sender: Sender {
                id: UserId("me".into()),
                display_name: "Me".into(),
            },
            sent_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
            edited_at: None,
            redacted: false,
            delivered: false,
        }
    }

    fn echoed(arn: &str, token: &str, id: &str, content: &str, at_ms: i64) -> Message {
        let mut message = local_message(arn, token, content, at_ms);
        message.id = Some(MessageId(id.to_string()));
        message.delivered = true;
        message
    }

    fn seed_channel(rec: &mut Reconciler, arn: &str) {
        rec.reconcile_channel_list(vec![channel(arn, "general")])
            .unwrap();
    }

    #[test]
    fn idempotent_merge() {
        let mut rec = reconciler();
        seed_channel(&mut rec, "arn:1");
        let arn = ChannelArn("arn:1".into());

        let batch = vec![
            echoed("arn:1", "tok-1", "srv-1", "one", 100),
            echoed("arn:1", "tok-2", "srv-2", "two", 200),
        ];

        let first = rec.merge_remote_messages(&arn, batch.clone()).unwrap();
        let second = rec.merge_remote_messages(&arn, batch).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
        // The store agrees.
        assert_eq!(rec.database().get_messages_for_channel(&arn).unwrap().len(), 2);
    }

    #[test]
    fn correlation_key_upsert() {
        let mut rec = reconciler();
        seed_channel(&mut rec, "arn:1");
        let arn = ChannelArn("arn:1".into());

        rec.append_local_message(local_message("arn:1", "tok-1", "hi", 100))
            .unwrap();

        let outcome = rec
            .merge_single(echoed("arn:1", "tok-1", "srv-42", "hi", 100))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Confirmed(MessageId("srv-42".into())));

        let messages = rec.messages(&arn);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Some(MessageId("srv-42".into())));
        assert!(messages[0].delivered);
    }

    #[test]
    fn non_destructive_update() {
        let mut rec = reconciler();
        seed_channel(&mut rec, "arn:1");
        let arn = ChannelArn("arn:1".into());
        let token = MetadataToken("tok-1".into());

        rec.append_local_message(local_message("arn:1", "tok-1", "hi", 100))
            .unwrap();
        // Edited locally after send, before the echo arrives.
        rec.edit_text(&arn, &token, "hi there").unwrap();

        rec.merge_single(echoed("arn:1", "tok-1", "srv-42", "hi", 100))
            .unwrap();

        let messages = rec.messages(&arn);
        assert_eq!(messages[0].body, MessageBody::Text("hi there".into()));
        assert!(messages[0].delivered);
        // The persisted copy kept the edit too.
        let stored = rec.database().get_message(&arn, &token).unwrap();
        assert_eq!(stored.body.text(), Some("hi there"));
    }

    #[test]
    fn deterministic_ordering() {
        let arn = ChannelArn("arn:1".into());
        let batch = vec![
            echoed("arn:1", "tok-c", "srv-c", "third", 300),
            echoed("arn:1", "tok-a", "srv-a", "first", 100),
            echoed("arn:1", "tok-b", "srv-b", "second", 200),
        ];

        let mut forward = reconciler();
        seed_channel(&mut forward, "arn:1");
        let merged_forward = forward.merge_remote_messages(&arn, batch.clone()).unwrap();

        let mut reversed = reconciler();
        seed_channel(&mut reversed, "arn:1");
        let mut batch_reversed = batch;
        batch_reversed.reverse();
        let merged_reversed = reversed.merge_remote_messages(&arn, batch_reversed).unwrap();

        let tokens = |msgs: &[Message]| -> Vec<String> {
            msgs.iter().map(|m| m.token.0.clone()).collect()
        };
        assert_eq!(tokens(&merged_forward), vec!["tok-a", "tok-b", "tok-c"]);
        assert_eq!(tokens(&merged_forward), tokens(&merged_reversed));
    }

    #[test]
    fn ties_keep_insertion_order_across_repeated_merges() {
        let mut rec = reconciler();
        seed_channel(&mut rec, "arn:1");
        let arn = ChannelArn("arn:1".into());

        let batch = vec![
            echoed("arn:1", "tok-x", "srv-x", "x", 100),
            echoed("arn:1", "tok-y", "srv-y", "y", 100),
        ];
        let first = rec.merge_remote_messages(&arn, batch.clone()).unwrap();
        let second = rec.merge_remote_messages(&arn, batch).unwrap();

        let order: Vec<&str> = first.iter().map(|m| m.token.as_str()).collect();
        assert_eq!(order, vec!["tok-x", "tok-y"]);
        assert_eq!(first, second);
    }

    #[test]
    fn channel_upsert_uniqueness() {
        let mut rec = reconciler();

        rec.reconcile_channel_list(vec![channel("arn:1", "Test")])
            .unwrap();
        let merged = rec
            .reconcile_channel_list(vec![channel("arn:1", "Test renamed"), channel("arn:2", "Other")])
            .unwrap();

        assert_eq!(merged.len(), 2);
        let names: Vec<&str> = merged
            .iter()
            .filter(|c| c.arn.as_str() == "arn:1")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Test renamed"]);
        assert_eq!(rec.database().list_channels().unwrap().len(), 2);
    }

    #[test]
    fn absent_remote_channels_are_left_untouched() {
        let mut rec = reconciler();
        rec.reconcile_channel_list(vec![channel("arn:1", "Kept"), channel("arn:2", "Other")])
            .unwrap();

        // A later sync that no longer lists arn:1 must not drop it.
        let merged = rec
            .reconcile_channel_list(vec![channel("arn:2", "Other")])
            .unwrap();
        assert_eq!(merged.len(), 2);

        // Explicit leave is the only deletion path.
        assert!(rec.remove_channel(&ChannelArn("arn:1".into())).unwrap());
        assert_eq!(rec.channels().len(), 1);
    }

    #[test]
    fn unread_bucket_reset() {
        let mut rec = reconciler();
        seed_channel(&mut rec, "arn:C");
        let arn = ChannelArn("arn:C".into());

        let live = vec![
            echoed("arn:C", "tok-1", "srv-1", "one", 100),
            echoed("arn:C", "tok-2", "srv-2", "two", 200),
            echoed("arn:C", "tok-3", "srv-3", "three", 300),
        ];
        for message in live.clone() {
            rec.merge_single(message.clone()).unwrap();
            rec.mark_new_message(&arn, message);
        }
        assert_eq!(rec.unread_count(&arn), 3);

        // Opening the detail view resets the bucket.
        rec.clear_new_messages(&arn);
        assert_eq!(rec.unread_count(&arn), 0);

        // Re-reconciling the same messages via a poll does not re-increment.
        rec.merge_remote_messages(&arn, live).unwrap();
        assert_eq!(rec.unread_count(&arn), 0);
    }

    #[test]
    fn merge_into_unknown_channel_fails_and_changes_nothing() {
        let mut rec = reconciler();
        let arn = ChannelArn("arn:ghost".into());

        let err = rec
            .merge_remote_messages(&arn, vec![echoed("arn:ghost", "tok-1", "srv-1", "x", 1)])
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownChannel(_)));
        assert!(rec.channels().is_empty());
    }

    #[test]
    fn hydration_restores_roster_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palaver.db");
        let arn = ChannelArn("arn:1".into());

        {
            let mut rec = Reconciler::new(Database::open_at(&path).unwrap()).unwrap();
            seed_channel(&mut rec, "arn:1");
            rec.append_local_message(local_message("arn:1", "tok-1", "offline draft", 100))
                .unwrap();
        }

        let rec = Reconciler::new(Database::open_at(&path).unwrap()).unwrap();
        let messages = rec.messages(&arn);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].token, MetadataToken("tok-1".into()));
        assert!(!messages[0].delivered);
    }

    /// End to end: empty store, channel reconcile, optimistic send, relay
    /// echo through the single merge path.
    #[test]
    fn end_to_end_send_and_echo() {
        let mut rec = reconciler();
        let arn = ChannelArn("arn:1".into());

        // (2)-(3) remote returns one channel with zero messages.
        let merged = rec
            .reconcile_channel_list(vec![channel("arn:1", "Test")])
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert!(rec.messages(&arn).is_empty());

        // (4) optimistic send.
        rec.append_local_message(local_message("arn:1", "m1", "hi", 100))
            .unwrap();
        let messages = rec.messages(&arn);
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].delivered);

        // (5) the live relay delivers the echo.
        let envelope = RelayEnvelope::from_json(
            r#"{
                "Headers": { "MessageType": "CHANNEL_MESSAGE" },
                "Payload": {
                    "ChannelArn": "arn:1",
                    "MessageId": "s1",
                    "Content": "hi",
                    "SenderArn": "me",
                    "SenderName": "Me",
                    "CreatedTimestamp": "100",
                    "Metadata": "m1"
                }
            }"#,
        )
        .unwrap();
        let echo = message_from_relay(&envelope.payload.unwrap()).unwrap();
        let outcome = rec.merge_single(echo).unwrap();
        assert_eq!(outcome, MergeOutcome::Confirmed(MessageId("s1".into())));

        let messages = rec.messages(&arn);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Some(MessageId("s1".into())));
        assert!(messages[0].delivered);
    }
}
