//! Application state shared across all client operations.
//!
//! The [`ClientState`] struct is wrapped in `Arc<Mutex<>>`; every mutation of
//! the in-memory channel/message collections happens under that lock, which
//! is the single serial context the reconciler's ordering guarantees rely on.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use palaver_net::RelayCommand;
use palaver_shared::types::ChannelArn;

use crate::reconciler::Reconciler;
use crate::session::Session;

/// Central client state.
pub struct ClientState {
    /// The signed-in user. `None` until sign-in succeeds.
    pub session: Option<Session>,

    /// Reconciler over the local database and the in-memory roster.
    /// `None` until the store is opened after sign-in.
    pub reconciler: Option<Reconciler>,

    /// Sender half of the channel used to command the relay task.
    /// `None` while the relay is disconnected.
    pub relay_cmd_tx: Option<mpsc::Sender<RelayCommand>>,

    /// Whether the relay socket is currently connected.
    pub relay_connected: bool,

    /// The channel whose detail view currently has focus, if any.
    /// Live messages for this channel do not accumulate as unread.
    pub focused_channel: Option<ChannelArn>,
}

impl ClientState {
    /// Create a new, uninitialised client state.
    pub fn new() -> Self {
        Self {
            session: None,
            reconciler: None,
            relay_cmd_tx: None,
            relay_connected: false,
            focused_channel: None,
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle passed to background tasks.
pub type SharedState = Arc<Mutex<ClientState>>;
