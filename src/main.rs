//! switchyard: dynamic HTTP reverse proxy backed by a Redis service registry
//!
//! Routes requests by Host header to backend instances registered in
//! Redis, refreshes its routing table on pub/sub notifications, and
//! health-checks every backend on a fixed interval.

use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;

use switchyard::config::AppConfig;
use switchyard::health::{spawn_health_checker, HealthSet};
use switchyard::proxy::{run_server, ProxyState};
use switchyard::registry::listener::spawn_update_listener;
use switchyard::registry::{RedisRegistry, Registry};
use switchyard::routing::RoutingTable;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version = "0.1.0")]
#[command(about = "Dynamic HTTP reverse proxy backed by a Redis service registry")]
#[command(long_about = "
switchyard routes inbound HTTP requests by Host header to one of the
backend instances registered for that application in Redis. The routing
table is reloaded on every message published to the 'updates' channel,
and every backend is probed on a fixed interval so unreachable instances
stop receiving traffic.

Configuration comes from the environment:
  PORT        listen port            (default 3000)
  REDIS_HOST  registry host          (default 127.0.0.1)
  REDIS_PORT  registry port          (default 6379)

Example usage:
  switchyard run
  switchyard run --port 8080
  switchyard test-registry
")]
struct Cli {
    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the resolved configuration
    CheckConfig,

    /// Test connection to the Redis registry
    TestRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port } => run_proxy(port).await?,
        Commands::CheckConfig => check_config()?,
        Commands::TestRegistry => test_registry().await?,
    }

    Ok(())
}

/// Run the proxy server
async fn run_proxy(port_override: Option<u16>) -> anyhow::Result<()> {
    install_panic_hook();

    let mut config = AppConfig::from_env()?;
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let registry = Arc::new(RedisRegistry::connect(&config.registry.url()).await?);
    let table = Arc::new(RoutingTable::new());
    let health = Arc::new(HealthSet::new());

    // Initial table load. A read error is not fatal here: the listener
    // retries on the next change notification. A dead registry is.
    if let Err(e) = table.refresh(registry.as_ref()).await {
        if e.is_fatal() {
            return Err(e.into());
        }
        tracing::error!(error = %e, "Initial routing table load failed, starting empty");
    }

    spawn_update_listener(config.registry.url(), table.clone(), registry.clone());
    spawn_health_checker(table.clone(), health.clone(), config.health.clone())?;

    let state = ProxyState::new(table, health)?;
    run_server(&config, state).await
}

/// Fail fast on any uncaught panic; the supervisor restarts us.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        tracing::error!("Caught panic. Aborting.");
        std::process::exit(1);
    }));
}

/// Print the resolved configuration
fn check_config() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    println!("Server:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("\nRegistry:");
    println!("  URL: {}", config.registry.url());
    println!("\nHealth probing:");
    println!("  Interval: {}s", config.health.interval_seconds);
    println!("  Timeout: {}s", config.health.timeout_seconds);
    println!("  Max concurrent probes: {}", config.health.max_concurrent_probes);
    Ok(())
}

/// Test connection to the registry and list what it knows
async fn test_registry() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    println!("Testing connection to registry: {}", config.registry.url());

    let registry = match RedisRegistry::connect(&config.registry.url()).await {
        Ok(registry) => {
            println!("✓ Registry is reachable");
            registry
        }
        Err(e) => {
            println!("✗ Failed to connect to registry: {}", e);
            std::process::exit(1);
        }
    };

    let apps = registry.applications().await?;
    println!("  Registered applications: {}", apps.len());
    for app in apps.iter().take(20) {
        let instances = registry.instances(app).await?;
        println!("    - {} ({} instances)", app, instances.len());
    }

    Ok(())
}
