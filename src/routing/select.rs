//! Backend selection among healthy instances

use std::collections::HashMap;

use rand::Rng;

use crate::health::HealthSet;

/// Result of resolving an application key against the routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The key is not present in the table at all
    UnknownApp,
    /// The key is known but has no healthy instance right now
    NoneAvailable,
    /// A healthy backend address to forward to
    Selected(String),
}

/// Pick one healthy instance for `app`, uniformly at random.
///
/// Selection has no memory across calls: no round-robin counter, no sticky
/// sessions. Each call draws an independent uniform sample from the
/// instances not currently marked unreachable.
pub fn select_instance(
    table: &HashMap<String, Vec<String>>,
    health: &HealthSet,
    app: &str,
) -> SelectOutcome {
    let Some(instances) = table.get(app) else {
        return SelectOutcome::UnknownApp;
    };

    let eligible: Vec<&String> = instances
        .iter()
        .filter(|addr| !health.is_unhealthy(addr))
        .collect();

    if eligible.is_empty() {
        return SelectOutcome::NoneAvailable;
    }

    let index = rand::thread_rng().gen_range(0..eligible.len());
    SelectOutcome::Selected(eligible[index].clone())
}
