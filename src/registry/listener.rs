//! Pub/sub listener that refreshes the routing table on registry changes

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;

use super::{Registry, RegistryError, UPDATES_CHANNEL};
use crate::routing::RoutingTable;

/// Why the notification loop stopped
enum ListenEnd {
    /// The message stream ended; the subscription connection is gone
    SubscriptionClosed,
    /// A refresh hit a connection-level registry error
    FatalError(RegistryError),
}

/// Spawn the update listener on its own pub/sub connection.
///
/// Any message on the `updates` channel triggers a full routing table
/// refresh; the payload is not interpreted. Losing the subscription
/// connection is fatal — we exit and let the supervisor restart us.
pub fn spawn_update_listener<R>(
    registry_url: String,
    table: Arc<RoutingTable>,
    registry: Arc<R>,
) -> JoinHandle<()>
where
    R: Registry + 'static,
{
    tokio::spawn(async move {
        let mut pubsub = match subscribe(&registry_url).await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe to registry updates. Aborting.");
                std::process::exit(1);
            }
        };

        let messages = pubsub
            .on_message()
            .map(|message| message.get_channel_name().to_string());
        tokio::pin!(messages);

        match drive_refreshes(messages, &table, registry.as_ref()).await {
            ListenEnd::FatalError(e) => {
                tracing::error!(error = %e, "Registry connection lost during refresh. Aborting.");
                std::process::exit(1);
            }
            ListenEnd::SubscriptionClosed => {
                tracing::error!("Registry subscription closed. Aborting.");
                std::process::exit(1);
            }
        }
    })
}

/// Refresh the table for every notification on the `updates` channel.
///
/// Recoverable refresh errors keep the previously installed table and the
/// loop keeps listening; connection-level errors and stream end are
/// returned for the caller to act on.
async fn drive_refreshes<S, R>(mut messages: S, table: &RoutingTable, registry: &R) -> ListenEnd
where
    S: Stream<Item = String> + Unpin,
    R: Registry + ?Sized,
{
    while let Some(channel) = messages.next().await {
        if channel != UPDATES_CHANNEL {
            continue;
        }
        tracing::info!("Registry change notification received");
        match table.refresh(registry).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return ListenEnd::FatalError(e),
            Err(e) => {
                tracing::error!(error = %e, "Refresh failed, keeping previous routing table");
            }
        }
    }

    ListenEnd::SubscriptionClosed
}

async fn subscribe(registry_url: &str) -> Result<redis::aio::PubSub, redis::RedisError> {
    let client = redis::Client::open(registry_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(UPDATES_CHANNEL).await?;
    Ok(pubsub)
}
