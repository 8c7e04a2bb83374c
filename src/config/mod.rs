//! Environment-driven configuration

use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub health: HealthConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Redis registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
}

impl RegistryConfig {
    /// Connection URL for the redis client
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Health probing configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Seconds between probe rounds
    pub interval_seconds: u64,
    /// Per-probe timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum probes in flight at once
    pub max_concurrent_probes: usize,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            timeout_seconds: 5,
            max_concurrent_probes: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    ///
    /// Recognized variables: `PORT` (listen port, default 3000),
    /// `REDIS_HOST` (default 127.0.0.1), `REDIS_PORT` (default 6379).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_port(&lookup, "PORT", 3000)?;
        let registry_host = lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let registry_port = parse_port(&lookup, "REDIS_PORT", 6379)?;

        Ok(Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port,
            },
            registry: RegistryConfig {
                host: registry_host,
                port: registry_port,
            },
            health: HealthConfig::default(),
        })
    }
}

fn parse_port<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} must be a port number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
