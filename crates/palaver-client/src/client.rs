//! Client facade.
//!
//! The operations a presentation layer drives: sign-in, sync, channel and
//! message actions, contacts, settings. Network and persistence failures
//! surface as typed [`ClientError`] values; there are no retries here --
//! retry is the caller's affordance (pull-to-refresh, resend).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use palaver_net::{ApiClient, RelayCommand, SendAttachment};
use palaver_shared::constants::{EVENT_BUFFER, MAX_MESSAGE_SIZE};
use palaver_shared::types::{
    ChannelArn, ChannelMode, ChannelPrivacy, MetadataToken, Presence, UserId,
};
use palaver_store::{
    AttachmentSource, Channel, Contact, Database, Message, MessageBody, MessageKind, Sender,
};

use crate::convert::channel_from_remote;
use crate::error::{ClientError, Result};
use crate::events::{emit_event, ClientEvent};
use crate::reconciler::Reconciler;
use crate::relay_bridge::start_relay_and_bridge;
use crate::session::Session;
use crate::settings::AppSettings;
use crate::state::{ClientState, SharedState};
use crate::sync::{full_sync, SyncReport};

pub struct PalaverClient {
    api: Arc<ApiClient>,
    state: SharedState,
    events: broadcast::Sender<ClientEvent>,
}

impl PalaverClient {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            api: Arc::new(ApiClient::new(api_base_url)),
            state: Arc::new(Mutex::new(ClientState::new())),
            events,
        }
    }

    /// Subscribe to state-change events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ClientState>> {
        self.state
            .lock()
            .map_err(|e| ClientError::Internal(format!("lock poisoned: {e}")))
    }

    fn with_reconciler<T>(&self, f: impl FnOnce(&mut Reconciler) -> Result<T>) -> Result<T> {
        let mut guard = self.lock_state()?;
        let reconciler = guard.reconciler.as_mut().ok_or(ClientError::NotSignedIn)?;
        f(reconciler)
    }

    fn session(&self) -> Result<Session> {
        self.lock_state()?
            .session
            .clone()
            .ok_or(ClientError::NotSignedIn)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Sign in and open the default local store.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let db = Database::new()?;
        self.sign_in_with_database(username, password, db).await
    }

    /// Sign in against an explicitly opened store (tests, custom layouts).
    pub async fn sign_in_with_database(
        &self,
        username: &str,
        password: &str,
        db: Database,
    ) -> Result<Session> {
        let resp = self.api.sign_in(username, password).await?;
        let session = Session::from(&resp);
        let reconciler = Reconciler::new(db)?;

        {
            let mut guard = self.lock_state()?;
            guard.session = Some(session.clone());
            guard.reconciler = Some(reconciler);
        }

        info!(user = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Drop the session, close the relay, and forget the bearer token.
    /// The local store is left intact for the next sign-in.
    pub async fn sign_out(&self) {
        let cmd_tx = match self.state.lock() {
            Ok(mut guard) => {
                guard.session = None;
                guard.reconciler = None;
                guard.focused_channel = None;
                guard.relay_connected = false;
                guard.relay_cmd_tx.take()
            }
            Err(_) => None,
        };
        if let Some(tx) = cmd_tx {
            let _ = tx.send(RelayCommand::Shutdown).await;
        }
        self.api.clear_token();
        info!("Signed out");
    }

    pub async fn update_profile(&self, display_name: &str) -> Result<()> {
        let profile = self.api.update_profile(display_name).await?;
        let mut guard = self.lock_state()?;
        if let Some(session) = guard.session.as_mut() {
            session.display_name = profile.display_name;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync & relay
    // ------------------------------------------------------------------

    /// Fetch and merge the channel list and every channel's messages.
    pub async fn sync(&self) -> Result<SyncReport> {
        full_sync(&self.api, &self.state).await
    }

    /// Open the live-update socket and start feeding its events through the
    /// reconciler.
    pub async fn connect_relay(&self) -> Result<()> {
        start_relay_and_bridge(&self.api, self.state.clone(), self.events.clone()).await
    }

    pub async fn disconnect_relay(&self) {
        let cmd_tx = match self.state.lock() {
            Ok(mut guard) => guard.relay_cmd_tx.take(),
            Err(_) => None,
        };
        if let Some(tx) = cmd_tx {
            let _ = tx.send(RelayCommand::Shutdown).await;
        }
    }

    // ------------------------------------------------------------------
    // Channel focus & queries
    // ------------------------------------------------------------------

    /// Mark a channel's detail view as focused: its unread bucket resets and
    /// further live messages stop accumulating as unread. Returns the
    /// channel's ordered messages.
    pub fn open_channel(&self, arn: &ChannelArn) -> Result<Vec<Message>> {
        let mut guard = self.lock_state()?;
        guard.focused_channel = Some(arn.clone());
        let reconciler = guard.reconciler.as_mut().ok_or(ClientError::NotSignedIn)?;
        reconciler.clear_new_messages(arn);
        drop(guard);

        emit_event(
            &self.events,
            ClientEvent::UnreadChanged {
                channel_arn: arn.clone(),
                count: 0,
            },
        );
        self.messages(arn)
    }

    /// Return focus to the channel list.
    pub fn close_channel(&self) {
        if let Ok(mut guard) = self.state.lock() {
            guard.focused_channel = None;
        }
    }

    pub fn channels(&self) -> Result<Vec<Channel>> {
        self.with_reconciler(|rec| Ok(rec.channels()))
    }

    pub fn messages(&self, arn: &ChannelArn) -> Result<Vec<Message>> {
        self.with_reconciler(|rec| Ok(rec.messages(arn)))
    }

    pub fn unread_count(&self, arn: &ChannelArn) -> Result<usize> {
        self.with_reconciler(|rec| Ok(rec.unread_count(arn)))
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Optimistic text send. The message lands in the channel (and the
    /// store) before the request goes out; if the request fails it stays
    /// with `delivered = false` and [`resend_message`] is the recovery path.
    ///
    /// [`resend_message`]: PalaverClient::resend_message
    pub async fn send_text_message(
        &self,
        arn: &ChannelArn,
        content: &str,
    ) -> Result<MetadataToken> {
        if content.len() > MAX_MESSAGE_SIZE {
            return Err(ClientError::InvalidInput(format!(
                "message too large: {} bytes",
                content.len()
            )));
        }

        let token = self.append_outgoing(arn, MessageBody::Text(content.to_string()))?;
        self.api
            .send_message(arn.as_str(), content, token.as_str())
            .await?;
        Ok(token)
    }

    /// Optimistic attachment send (multipart upload).
    pub async fn send_attachment_message(
        &self,
        arn: &ChannelArn,
        attachment: SendAttachment,
    ) -> Result<MetadataToken> {
        let source = AttachmentSource::Bytes(attachment.bytes.clone());
        let body = if attachment.file_type.starts_with("image/") {
            MessageBody::Image {
                source,
                file_name: attachment.file_name.clone(),
            }
        } else if attachment.file_type.starts_with("audio/") {
            MessageBody::Audio {
                source,
                duration_secs: attachment.duration_secs.unwrap_or(0),
            }
        } else {
            MessageBody::File {
                source,
                file_name: attachment.file_name.clone(),
            }
        };

        let token = self.append_outgoing(arn, body)?;
        self.api
            .send_attachment(arn.as_str(), token.as_str(), attachment)
            .await?;
        Ok(token)
    }

    /// Create a meeting and share its link into a channel.
    pub async fn share_meeting_link(&self, arn: &ChannelArn) -> Result<MetadataToken> {
        let meeting = self.api.create_meeting().await?;
        let token =
            self.append_outgoing(arn, MessageBody::MeetingLink(meeting.join_url.clone()))?;
        self.api
            .send_message(arn.as_str(), &meeting.join_url, token.as_str())
            .await?;
        Ok(token)
    }

    /// Re-issue the network send for a message that never got delivered.
    pub async fn resend_message(&self, arn: &ChannelArn, token: &MetadataToken) -> Result<()> {
        let message = self.with_reconciler(|rec| {
            rec.messages(arn)
                .into_iter()
                .find(|m| &m.token == token)
                .ok_or_else(|| ClientError::InvalidInput(format!("no message {token}")))
        })?;

        if message.delivered {
            return Err(ClientError::InvalidInput(format!(
                "message {token} is already delivered"
            )));
        }

        match message.body {
            MessageBody::Text(ref content) | MessageBody::MeetingLink(ref content) => {
                self.api
                    .send_message(arn.as_str(), content, token.as_str())
                    .await?;
            }
            MessageBody::Image { ref source, ref file_name }
            | MessageBody::File { ref source, ref file_name } => {
                let AttachmentSource::Bytes(ref bytes) = *source else {
                    return Err(ClientError::InvalidInput(
                        "attachment payload is no longer available locally".into(),
                    ));
                };
                let file_type = if matches!(message.body, MessageBody::Image { .. }) {
                    "image/jpeg"
                } else {
                    "application/octet-stream"
                };
                self.api
                    .send_attachment(
                        arn.as_str(),
                        token.as_str(),
                        SendAttachment {
                            bytes: bytes.clone(),
                            file_name: file_name.clone(),
                            file_type: file_type.into(),
                            duration_secs: None,
                        },
                    )
                    .await?;
            }
            MessageBody::Audio { ref source, duration_secs } => {
                let AttachmentSource::Bytes(ref bytes) = *source else {
                    return Err(ClientError::InvalidInput(
                        "attachment payload is no longer available locally".into(),
                    ));
                };
                self.api
                    .send_attachment(
                        arn.as_str(),
                        token.as_str(),
                        SendAttachment {
                            bytes: bytes.clone(),
                            file_name: String::new(),
                            file_type: "audio/mp4".into(),
                            duration_secs: Some(duration_secs),
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Build the outgoing message, append it to memory and store.
    fn append_outgoing(&self, arn: &ChannelArn, body: MessageBody) -> Result<MetadataToken> {
        let session = self.session()?;
        let token = MetadataToken::generate();

        let message = Message {
            id: None,
            token: token.clone(),
            channel_arn: arn.clone(),
            kind: MessageKind::Standard,
            body,
            sender: Sender {
                id: session.user_id,
                display_name: session.display_name,
            },
            sent_at: Utc::now(),
            edited_at: None,
            redacted: false,
            delivered: false,
        };

        self.with_reconciler(|rec| rec.append_local_message(message))?;
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Editing & deleting
    // ------------------------------------------------------------------

    /// Edit a text message. The local copy changes immediately (and the
    /// merge path will not clobber it); the remote edit only goes out once
    /// the message has a server id.
    pub async fn edit_message(
        &self,
        arn: &ChannelArn,
        token: &MetadataToken,
        content: &str,
    ) -> Result<()> {
        let server_id = self.with_reconciler(|rec| {
            rec.edit_text(arn, token, content)?;
            Ok(rec
                .messages(arn)
                .into_iter()
                .find(|m| &m.token == token)
                .and_then(|m| m.id))
        })?;

        match server_id {
            Some(id) => {
                self.api
                    .edit_message(arn.as_str(), id.as_str(), content)
                    .await?;
            }
            None => {
                warn!(token = %token, "Edited message has no server id yet, edit kept local");
            }
        }
        Ok(())
    }

    /// Delete a message remotely, then locally. The local row only goes
    /// away once the server confirms.
    pub async fn delete_message(&self, arn: &ChannelArn, token: &MetadataToken) -> Result<()> {
        let server_id = self
            .with_reconciler(|rec| {
                Ok(rec
                    .messages(arn)
                    .into_iter()
                    .find(|m| &m.token == token)
                    .and_then(|m| m.id))
            })?
            .ok_or_else(|| {
                ClientError::InvalidInput(format!("message {token} has no server id"))
            })?;

        self.api
            .delete_message(arn.as_str(), server_id.as_str())
            .await?;
        self.with_reconciler(|rec| rec.delete_message(arn, token))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub async fn create_channel(
        &self,
        name: &str,
        privacy: ChannelPrivacy,
        mode: ChannelMode,
        metadata: Option<&str>,
    ) -> Result<Channel> {
        let remote = self
            .api
            .create_channel(name, privacy.as_str(), mode.as_str(), metadata)
            .await?;
        let channel = channel_from_remote(remote);
        self.with_reconciler(|rec| rec.reconcile_channel_list(vec![channel.clone()]))?;
        info!(channel = %channel.arn.short(), name = %channel.name, "Channel created");
        Ok(channel)
    }

    /// Leave a channel remotely, then drop it (and its messages) locally.
    pub async fn leave_channel(&self, arn: &ChannelArn) -> Result<()> {
        self.api.leave_channel(arn.as_str()).await?;
        self.with_reconciler(|rec| rec.remove_channel(arn))?;
        info!(channel = %arn.short(), "Left channel");
        Ok(())
    }

    /// Search public channels by name. Results are not persisted until the
    /// user actually joins one.
    pub async fn find_channels(&self, name: &str) -> Result<Vec<Channel>> {
        let remote = self.api.find_channels(name).await?;
        Ok(remote.into_iter().map(channel_from_remote).collect())
    }

    // ------------------------------------------------------------------
    // Members & contacts
    // ------------------------------------------------------------------

    pub async fn add_member(&self, arn: &ChannelArn, user_id: &UserId) -> Result<()> {
        self.api.add_member(arn.as_str(), user_id.as_str()).await
            .map_err(ClientError::from)
    }

    /// Fetch a channel's member list and refresh the local contacts.
    pub async fn refresh_members(&self, arn: &ChannelArn) -> Result<Vec<Contact>> {
        let members = self.api.list_members(arn.as_str()).await?;

        let contacts: Vec<Contact> = members
            .into_iter()
            .map(|member| Contact {
                user_id: UserId(member.user_id),
                display_name: member.display_name,
                presence: member
                    .presence
                    .as_deref()
                    .and_then(Presence::parse)
                    .unwrap_or(Presence::Unknown),
                created_at: Utc::now(),
            })
            .collect();

        self.with_reconciler(|rec| {
            for contact in &contacts {
                rec.database().upsert_contact(contact)?;
            }
            Ok(())
        })?;

        Ok(contacts)
    }

    pub fn contacts(&self) -> Result<Vec<Contact>> {
        self.with_reconciler(|rec| Ok(rec.database().list_contacts()?))
    }

    /// Poll a contact's presence and record it.
    pub async fn refresh_presence(&self, user_id: &UserId) -> Result<Presence> {
        let member = self.api.get_presence(user_id.as_str()).await?;
        let presence = member
            .presence
            .as_deref()
            .and_then(Presence::parse)
            .unwrap_or(Presence::Unknown);

        self.with_reconciler(|rec| {
            rec.database().set_presence(user_id, presence)?;
            Ok(())
        })?;

        emit_event(
            &self.events,
            ClientEvent::PresenceChanged {
                user_id: user_id.clone(),
                presence,
            },
        );
        Ok(presence)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> Result<AppSettings> {
        self.with_reconciler(|rec| AppSettings::load(rec.database()))
    }

    pub fn update_settings(&self, settings: &AppSettings) -> Result<()> {
        self.with_reconciler(|rec| settings.save(rec.database()))
    }
}
