//! Bridge between the relay task and the reconciler.
//!
//! Fetches the signed URL, spawns the relay, stores its command sender in
//! the client state, and spawns the notification processing loop. Every
//! decoded message event is fed through the same reconciler merge path as
//! polling, under the state lock.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use palaver_net::{spawn_relay, ApiClient, RelayNotification};
use palaver_shared::protocol::{RelayEnvelope, RelayEventKind};

use crate::convert::message_from_relay;
use crate::events::{emit_event, ClientEvent};
use crate::reconciler::MergeOutcome;
use crate::state::SharedState;

/// Connect the relay, record its command channel in the client state, and
/// spawn the notification loop that feeds events into the reconciler.
pub async fn start_relay_and_bridge(
    api: &ApiClient,
    state: SharedState,
    events: broadcast::Sender<ClientEvent>,
) -> Result<(), crate::error::ClientError> {
    let signed_url = api.relay_url().await?;
    let (cmd_tx, notif_rx) = spawn_relay(&signed_url).await?;

    {
        let mut guard = state
            .lock()
            .map_err(|e| crate::error::ClientError::Internal(format!("lock poisoned: {e}")))?;
        guard.relay_cmd_tx = Some(cmd_tx);
        guard.relay_connected = true;
    }
    emit_event(&events, ClientEvent::RelayStateChanged { connected: true });

    tokio::spawn(async move {
        notification_loop(state, events, notif_rx).await;
    });

    Ok(())
}

/// Main loop that receives relay notifications and dispatches message
/// events into the reconciler.
async fn notification_loop(
    state: SharedState,
    events: broadcast::Sender<ClientEvent>,
    mut notif_rx: mpsc::Receiver<RelayNotification>,
) {
    info!("Relay bridge started");

    while let Some(notification) = notif_rx.recv().await {
        match notification {
            RelayNotification::Event(envelope) => {
                handle_relay_event(&state, &events, envelope);
            }
            RelayNotification::Disconnected { reason } => {
                warn!(reason = ?reason, "Relay disconnected");
                break;
            }
        }
    }

    // Covers both an explicit Disconnected notification and the relay task
    // simply going away.
    if let Ok(mut guard) = state.lock() {
        guard.relay_connected = false;
        guard.relay_cmd_tx = None;
    }
    emit_event(&events, ClientEvent::RelayStateChanged { connected: false });

    info!("Relay bridge ended");
}

/// Decode one envelope and merge it.
fn handle_relay_event(
    state: &SharedState,
    events: &broadcast::Sender<ClientEvent>,
    envelope: RelayEnvelope,
) {
    match envelope.kind() {
        RelayEventKind::Message => {}
        RelayEventKind::SessionEstablished => {
            debug!("Relay session established");
            return;
        }
        RelayEventKind::Other => {
            debug!(headers = ?envelope.headers, "Ignoring relay event");
            return;
        }
    }

    let Some(payload) = envelope.payload else {
        debug!("Message event without payload");
        return;
    };

    let message = match message_from_relay(&payload) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Undecodable message payload");
            return;
        }
    };

    let arn = message.channel_arn.clone();
    let token = message.token.clone();
    let sender = message.sender.id.clone();

    let mut guard = match state.lock() {
        Ok(g) => g,
        Err(_) => return,
    };

    let focused = guard.focused_channel.as_ref() == Some(&arn);
    let Some(reconciler) = guard.reconciler.as_mut() else {
        debug!("Live message before store is open, dropping");
        return;
    };

    if !reconciler.roster().contains(&arn) {
        debug!(channel = %arn, "Live message for unknown channel");
        return;
    }

    // The in-memory merge happens first; a store write failure leaves the
    // roster updated and is logged, not propagated (there is no caller).
    let outcome = match reconciler.merge_single(message.clone()) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, channel = %arn, "Failed to persist live message");
            return;
        }
    };

    match outcome {
        MergeOutcome::Inserted => {
            if !focused {
                let count = reconciler.mark_new_message(&arn, message);
                emit_event(
                    events,
                    ClientEvent::UnreadChanged {
                        channel_arn: arn.clone(),
                        count,
                    },
                );
            }
            info!(channel = %arn.short(), sender = %sender, "Live message stored");
            emit_event(
                events,
                ClientEvent::NewMessage {
                    channel_arn: arn,
                    token,
                    sender,
                },
            );
        }
        MergeOutcome::Confirmed(message_id) => {
            info!(channel = %arn.short(), id = %message_id, "Own message delivered");
            emit_event(
                events,
                ClientEvent::MessageDelivered {
                    channel_arn: arn,
                    token,
                    message_id,
                },
            );
        }
        MergeOutcome::Unchanged => {}
    }
}
