//! Proxy server wiring

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handler::ProxyHandler;
use crate::config::AppConfig;
use crate::health::HealthSet;
use crate::routing::RoutingTable;

/// Path answered directly by this process, never proxied. External load
/// balancers and our own prober use it as the liveness target.
pub const LIVENESS_PATH: &str = "/_ping";

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub table: Arc<RoutingTable>,
    pub health: Arc<HealthSet>,
    pub http_client: reqwest::Client,
}

impl ProxyState {
    /// Build proxy state around the shared routing table and health set.
    ///
    /// The forwarding client deliberately carries no request timeout: a
    /// proxied request runs until the backend responds or the connection
    /// fails.
    pub fn new(
        table: Arc<RoutingTable>,
        health: Arc<HealthSet>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self {
            table,
            health,
            http_client,
        })
    }
}

/// Build the axum router: the liveness route plus a catch-all that proxies
/// everything else by Host header.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(LIVENESS_PATH, get(ping_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the proxy server
pub async fn run_server(config: &AppConfig, state: ProxyState) -> anyhow::Result<()> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    Ok(axum::serve(listener, app).await?)
}

/// Self liveness endpoint
async fn ping_handler() -> &'static str {
    "pong"
}

/// Catch-all handler proxying by Host header
async fn proxy_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let handler = ProxyHandler::new(state);
    handler.handle(req).await
}
