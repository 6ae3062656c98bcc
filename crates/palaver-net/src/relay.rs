//! Live-update relay.
//!
//! The relay delivers server push events over a WebSocket opened against a
//! one-shot signed URL (obtained from the API). The socket task runs in a
//! dedicated tokio task for the lifetime of the owning view and forwards
//! every decoded envelope into a notification channel: the subscription is
//! continuous, so there is no receive/re-arm gap in which an event can be
//! dropped. External code communicates with the task through typed command
//! and notification channels.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

use palaver_shared::constants::RELAY_BUFFER;
use palaver_shared::protocol::RelayEnvelope;

use crate::error::RelayError;

/// Commands sent *into* the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    /// Close the socket and end the task.
    Shutdown,
}

/// Notifications sent *from* the relay task to the application.
#[derive(Debug, Clone)]
pub enum RelayNotification {
    /// A decoded envelope arrived.
    Event(RelayEnvelope),
    /// The socket closed; the relay is back in the disconnected state.
    Disconnected { reason: Option<String> },
}

/// Connect to the relay and spawn its read loop in a background tokio task.
///
/// The handshake against the signed URL happens before this function
/// returns, so a successful return means the relay is in the connected
/// state. Returns channels for sending commands and receiving notifications.
pub async fn spawn_relay(
    signed_url: &str,
) -> Result<(mpsc::Sender<RelayCommand>, mpsc::Receiver<RelayNotification>), RelayError> {
    let (mut ws_stream, _resp) = connect_async(signed_url)
        .await
        .map_err(|e| RelayError::Handshake(e.to_string()))?;

    info!("Relay connected");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<RelayCommand>(8);
    let (notif_tx, notif_rx) = mpsc::channel::<RelayNotification>(RELAY_BUFFER);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                // --- Incoming commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(RelayCommand::Shutdown) => {
                            info!("Relay shutdown requested");
                        }
                        None => {
                            // All senders dropped
                            info!("Relay command channel closed, ending task");
                        }
                    }
                    let _ = ws_stream.send(WsMessage::Close(None)).await;
                    let _ = notif_tx
                        .send(RelayNotification::Disconnected { reason: None })
                        .await;
                    break;
                }

                // --- Socket frames ---
                frame = ws_stream.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(raw))) => {
                            match RelayEnvelope::from_json(&raw) {
                                Ok(envelope) => {
                                    let _ = notif_tx
                                        .send(RelayNotification::Event(envelope))
                                        .await;
                                }
                                Err(e) => {
                                    debug!(error = %e, len = raw.len(), "Undecodable relay frame");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            if let Err(e) = ws_stream.send(WsMessage::Pong(payload)).await {
                                warn!(error = %e, "Failed to answer relay ping");
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            info!(reason = ?reason, "Relay closed by server");
                            let _ = notif_tx
                                .send(RelayNotification::Disconnected { reason })
                                .await;
                            break;
                        }
                        Some(Ok(other)) => {
                            debug!(frame = ?other, "Ignoring non-text relay frame");
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Relay read error");
                            let _ = notif_tx
                                .send(RelayNotification::Disconnected {
                                    reason: Some(e.to_string()),
                                })
                                .await;
                            break;
                        }
                        None => {
                            info!("Relay stream ended");
                            let _ = notif_tx
                                .send(RelayNotification::Disconnected { reason: None })
                                .await;
                            break;
                        }
                    }
                }
            }
        }

        info!("Relay task terminated");
    });

    Ok((cmd_tx, notif_rx))
}
