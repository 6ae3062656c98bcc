//! Full synchronization flow.
//!
//! Fetch the channel list, reconcile it, then fan out one message fetch per
//! channel and fan back in with a join barrier. Per-channel failures are
//! collected into the report instead of aborting the whole sync; a failed
//! channel-list fetch aborts before anything local is touched.

use futures::future::join_all;
use tracing::info;

use palaver_net::ApiClient;
use palaver_shared::types::ChannelArn;
use palaver_store::{Channel, Message};

use crate::convert::{channel_from_remote, message_from_remote};
use crate::error::{ClientError, Result};
use crate::state::SharedState;

/// One channel whose message fetch or merge failed during a sync.
#[derive(Debug)]
pub struct ChannelSyncFailure {
    pub channel_arn: ChannelArn,
    pub error: ClientError,
}

/// Outcome of a full sync.
#[derive(Debug)]
pub struct SyncReport {
    /// The merged channel list.
    pub channels: Vec<Channel>,
    /// Channels whose messages could not be fetched or merged this round.
    pub failures: Vec<ChannelSyncFailure>,
}

pub async fn full_sync(api: &ApiClient, state: &SharedState) -> Result<SyncReport> {
    // Channel list first. A failure here surfaces to the caller and leaves
    // all local state unchanged.
    let remote_channels = api.list_channels().await?;
    let incoming: Vec<Channel> = remote_channels.into_iter().map(channel_from_remote).collect();

    let channels = {
        let mut guard = state
            .lock()
            .map_err(|e| ClientError::Internal(format!("lock poisoned: {e}")))?;
        let reconciler = guard.reconciler.as_mut().ok_or(ClientError::NotSignedIn)?;
        reconciler.reconcile_channel_list(incoming)?
    };

    // Fan out: one message fetch per channel, all in flight at once.
    let fetches = channels.iter().map(|channel| {
        let arn = channel.arn.clone();
        async move {
            let result = api.list_messages(arn.as_str()).await;
            (arn, result)
        }
    });
    let results = join_all(fetches).await;

    // Fan in: merge every batch under the state lock.
    let mut failures = Vec::new();
    {
        let mut guard = state
            .lock()
            .map_err(|e| ClientError::Internal(format!("lock poisoned: {e}")))?;
        let reconciler = guard.reconciler.as_mut().ok_or(ClientError::NotSignedIn)?;

        for (arn, result) in results {
            let outcome = result.map_err(ClientError::from).and_then(|remote| {
                let mut batch: Vec<Message> = Vec::with_capacity(remote.len());
                for message in remote {
                    batch.push(message_from_remote(message)?);
                }
                reconciler.merge_remote_messages(&arn, batch)?;
                Ok(())
            });

            if let Err(error) = outcome {
                failures.push(ChannelSyncFailure {
                    channel_arn: arn,
                    error,
                });
            }
        }
    }

    info!(
        channels = channels.len(),
        failures = failures.len(),
        "full sync complete"
    );

    Ok(SyncReport { channels, failures })
}
