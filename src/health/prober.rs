//! Periodic liveness probing of registered backends

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tokio::time;

use super::HealthSet;
use crate::config::HealthConfig;
use crate::routing::{RoutingTable, TableSnapshot};

/// Liveness path every registered backend must answer with 200
pub const PROBE_PATH: &str = "/ping";

/// Spawn the background probe loop.
///
/// Every interval tick the current routing table snapshot is flattened,
/// deduplicated, and probed with at most `max_concurrent_probes` requests
/// in flight. Probing never blocks request handling or refresh; all three
/// read independent snapshots of the same table.
pub fn spawn_health_checker(
    table: Arc<RoutingTable>,
    health: Arc<HealthSet>,
    config: HealthConfig,
) -> Result<JoinHandle<()>, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()?;

    Ok(tokio::spawn(async move {
        let mut interval = time::interval(config.interval());
        // Skip the immediate first tick so backends get a grace period
        // between the startup refresh and the first probe round.
        interval.tick().await;

        loop {
            interval.tick().await;
            probe_all(
                &table.snapshot(),
                &health,
                &client,
                config.max_concurrent_probes,
            )
            .await;
        }
    }))
}

/// Probe every distinct address reachable from the given table snapshot.
///
/// Failures are isolated per address: one dead backend never aborts the
/// round for the others.
pub async fn probe_all(
    snapshot: &TableSnapshot,
    health: &HealthSet,
    client: &reqwest::Client,
    max_concurrent: usize,
) {
    let addresses: HashSet<&String> = snapshot.values().flatten().collect();
    let probed = addresses.len();

    futures::stream::iter(addresses)
        .for_each_concurrent(max_concurrent, |addr| async move {
            probe_one(client, health, addr).await;
        })
        .await;

    tracing::debug!(probed, unreachable = health.len(), "Probe round complete");
}

async fn probe_one(client: &reqwest::Client, health: &HealthSet, addr: &str) {
    let url = format!("http://{}{}", addr, PROBE_PATH);
    match client.get(&url).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            health.mark_healthy(addr);
        }
        Ok(response) => {
            tracing::warn!(addr = %addr, status = %response.status(), "Backend probe returned non-200");
            health.mark_unhealthy(addr);
        }
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "Could not reach backend");
            health.mark_unhealthy(addr);
        }
    }
}
