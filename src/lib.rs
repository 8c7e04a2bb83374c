//! switchyard: dynamic HTTP reverse proxy backed by a Redis service registry
//!
//! Features:
//! - Host-header routing to backend instances registered in Redis
//! - Pub/sub driven routing table refresh (no polling of the registry)
//! - Periodic bounded-concurrency health probing of every known backend
//! - Uniform random selection among healthy instances

pub mod config;
pub mod health;
pub mod proxy;
pub mod registry;
pub mod routing;

pub use config::AppConfig;
pub use proxy::{run_server, ProxyState};
pub use routing::RoutingTable;
