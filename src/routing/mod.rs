//! In-memory routing table: application key -> backend instances

mod select;

pub use select::{select_instance, SelectOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::future;

use crate::registry::{Registry, RegistryError};

/// Snapshot type handed to readers
pub type TableSnapshot = Arc<HashMap<String, Vec<String>>>;

/// Lock-free routing table mapping application keys to backend addresses.
///
/// Uses `ArcSwap` so the whole table is replaced atomically on refresh and
/// readers on the hot path never take a lock. A reader keeps operating on
/// the snapshot it loaded even if a refresh installs a newer table
/// mid-flight; that staleness window is accepted.
pub struct RoutingTable {
    apps: ArcSwap<HashMap<String, Vec<String>>>,
}

impl RoutingTable {
    /// Create an empty table. It stays empty until the first refresh.
    pub fn new() -> Self {
        Self {
            apps: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Current table snapshot for request handling or probing
    pub fn snapshot(&self) -> TableSnapshot {
        self.apps.load_full()
    }

    /// Atomically replace the entire table
    pub fn install(&self, table: HashMap<String, Vec<String>>) {
        self.apps.store(Arc::new(table));
    }

    /// Rebuild the table from the registry and install it.
    ///
    /// Fetches the full application key set, then every per-application
    /// instance set concurrently. If any read fails the previously
    /// installed table is left untouched — a partial registry read must
    /// never produce a partially updated table. Overlapping refreshes are
    /// last-writer-wins, never a merge.
    pub async fn refresh<R: Registry + ?Sized>(&self, registry: &R) -> Result<(), RegistryError> {
        let apps = registry.applications().await?;

        let fetches = apps.into_iter().map(|app| async move {
            let instances = registry.instances(&app).await?;
            Ok::<_, RegistryError>((app, instances))
        });
        let entries = future::try_join_all(fetches).await?;

        let table: HashMap<String, Vec<String>> = entries.into_iter().collect();
        tracing::info!(
            apps = table.len(),
            "Loading routing table:\n{}",
            serde_json::to_string_pretty(&table).unwrap_or_else(|_| "<unprintable>".to_string())
        );
        self.install(table);
        Ok(())
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Registry stub that can be told to fail per-application reads
    struct StubRegistry {
        apps: Vec<String>,
        instances: HashMap<String, Vec<String>>,
        fail_on: Option<String>,
    }

    impl StubRegistry {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            Self {
                apps: entries.iter().map(|(app, _)| app.to_string()).collect(),
                instances: entries
                    .iter()
                    .map(|(app, addrs)| {
                        (
                            app.to_string(),
                            addrs.iter().map(|a| a.to_string()).collect(),
                        )
                    })
                    .collect(),
                fail_on: None,
            }
        }

        fn failing_on(mut self, app: &str) -> Self {
            self.fail_on = Some(app.to_string());
            self
        }
    }

    fn read_error() -> RegistryError {
        RegistryError::Redis(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "simulated read failure",
        )))
    }

    #[async_trait]
    impl Registry for StubRegistry {
        async fn applications(&self) -> Result<Vec<String>, RegistryError> {
            Ok(self.apps.clone())
        }

        async fn instances(&self, app: &str) -> Result<Vec<String>, RegistryError> {
            if self.fail_on.as_deref() == Some(app) {
                return Err(read_error());
            }
            Ok(self.instances.get(app).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_refresh_installs_full_registry_state() {
        let registry = StubRegistry::new(&[
            ("app-a", &["10.0.0.1:80", "10.0.0.2:80"]),
            ("app-b", &["10.0.1.1:80"]),
        ]);
        let table = RoutingTable::new();

        table.refresh(&registry).await.unwrap();

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 2);
        let addrs: HashSet<_> = snapshot["app-a"].iter().cloned().collect();
        assert_eq!(
            addrs,
            HashSet::from(["10.0.0.1:80".to_string(), "10.0.0.2:80".to_string()])
        );
        assert_eq!(snapshot["app-b"], vec!["10.0.1.1:80".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_keeps_empty_instance_lists() {
        // "known app with zero instances" is distinct from "unknown app"
        let registry = StubRegistry::new(&[("app-a", &[])]);
        let table = RoutingTable::new();

        table.refresh(&registry).await.unwrap();

        let snapshot = table.snapshot();
        assert!(snapshot.contains_key("app-a"));
        assert!(snapshot["app-a"].is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_previous_table_untouched() {
        let table = RoutingTable::new();
        let good = StubRegistry::new(&[("app-a", &["10.0.0.1:80"])]);
        table.refresh(&good).await.unwrap();

        let bad = StubRegistry::new(&[
            ("app-a", &["10.0.0.9:80"]),
            ("app-b", &["10.0.1.1:80"]),
        ])
        .failing_on("app-b");

        let result = table.refresh(&bad).await;
        assert!(result.is_err());

        // The partial read of the failing registry must not leak through.
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["app-a"], vec!["10.0.0.1:80".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let table = RoutingTable::new();
        table.refresh(&StubRegistry::new(&[("app-a", &["10.0.0.1:80"])]))
            .await
            .unwrap();
        table.refresh(&StubRegistry::new(&[("app-b", &["10.0.1.1:80"])]))
            .await
            .unwrap();

        let snapshot = table.snapshot();
        assert!(!snapshot.contains_key("app-a"));
        assert!(snapshot.contains_key("app-b"));
    }

    #[tokio::test]
    async fn test_reader_snapshot_survives_refresh() {
        let table = RoutingTable::new();
        table.refresh(&StubRegistry::new(&[("app-a", &["10.0.0.1:80"])]))
            .await
            .unwrap();

        let held = table.snapshot();
        table.refresh(&StubRegistry::new(&[("app-b", &["10.0.1.1:80"])]))
            .await
            .unwrap();

        // A reader that loaded the old snapshot keeps a consistent view.
        assert!(held.contains_key("app-a"));
        assert!(table.snapshot().contains_key("app-b"));
    }
}
