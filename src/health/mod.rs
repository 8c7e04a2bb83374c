//! Backend health tracking

mod prober;

pub use prober::{probe_all, spawn_health_checker};

use dashmap::DashSet;

/// Set of backend addresses currently considered unreachable.
///
/// An address not in the set is assumed healthy. Membership is decided by
/// the most recent probe for that address (last probe wins); entries for
/// addresses that have since left the routing table are harmless and are
/// not proactively pruned.
pub struct HealthSet {
    unreachable: DashSet<String>,
}

impl HealthSet {
    pub fn new() -> Self {
        Self {
            unreachable: DashSet::new(),
        }
    }

    /// Record a successful probe for `addr`
    pub fn mark_healthy(&self, addr: &str) {
        self.unreachable.remove(addr);
    }

    /// Record a failed probe for `addr`
    pub fn mark_unhealthy(&self, addr: &str) {
        self.unreachable.insert(addr.to_string());
    }

    pub fn is_unhealthy(&self, addr: &str) -> bool {
        self.unreachable.contains(addr)
    }

    /// Number of addresses currently marked unreachable
    pub fn len(&self) -> usize {
        self.unreachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unreachable.is_empty()
    }
}

impl Default for HealthSet {
    fn default() -> Self {
        Self::new()
    }
}
