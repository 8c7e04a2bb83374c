//! Redis-backed service registry
//!
//! The registry holds one set named `apps` listing every application key,
//! and one set per application named `<app>:instances` listing its
//! `host:port` backends. Change notifications arrive on the `updates`
//! pub/sub channel (see [`listener`]).

pub mod listener;

use async_trait::async_trait;
use redis::AsyncCommands;

/// Pub/sub channel carrying registry change notifications
pub const UPDATES_CHANNEL: &str = "updates";

/// Set holding all known application keys
const APPS_KEY: &str = "apps";

/// Read access to the backend registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// All application keys known to the registry
    async fn applications(&self) -> Result<Vec<String>, RegistryError>;

    /// The `host:port` instances registered for one application
    async fn instances(&self, app: &str) -> Result<Vec<String>, RegistryError>;
}

/// Registry client speaking to Redis over a multiplexed connection
#[derive(Clone)]
pub struct RedisRegistry {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisRegistry {
    /// Connect to the registry. Fails fast if Redis is unreachable.
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn applications(&self) -> Result<Vec<String>, RegistryError> {
        let mut connection = self.connection.clone();
        Ok(connection.smembers(APPS_KEY).await?)
    }

    async fn instances(&self, app: &str) -> Result<Vec<String>, RegistryError> {
        let mut connection = self.connection.clone();
        Ok(connection.smembers(format!("{}:instances", app)).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RegistryError {
    /// Connection-level failures are fatal to the process; the supervisor
    /// restarts us rather than letting us serve from a silently stale table.
    pub fn is_fatal(&self) -> bool {
        match self {
            RegistryError::Redis(err) => {
                err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
            }
        }
    }
}
