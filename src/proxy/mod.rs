//! HTTP proxy surface

mod handler;
mod server;

pub use handler::ProxyHandler;
pub use server::{router, run_server, ProxyState, LIVENESS_PATH};
