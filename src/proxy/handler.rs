//! Request/response handler for the proxy

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::server::ProxyState;
use crate::routing::{select_instance, SelectOutcome};

/// Proxy request handler
pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Application key derived from the Host header, `:port` suffix stripped
    fn app_from_host(req: &Request<Body>) -> Option<String> {
        let host = req.headers().get(header::HOST)?.to_str().ok()?;
        let app = host.split(':').next().unwrap_or("");
        if app.is_empty() {
            None
        } else {
            Some(app.to_string())
        }
    }

    /// Handle an incoming request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let Some(app) = Self::app_from_host(&req) else {
            return (StatusCode::BAD_REQUEST, "Invalid hostname").into_response();
        };

        // One snapshot per request; a refresh installing a newer table
        // mid-flight does not affect us.
        let table = self.state.table.snapshot();

        match select_instance(&table, &self.state.health, &app) {
            SelectOutcome::UnknownApp => {
                tracing::debug!(app = %app, "No backend registered");
                (
                    StatusCode::NOT_FOUND,
                    format!("No backend found for {}", app),
                )
                    .into_response()
            }
            SelectOutcome::NoneAvailable => {
                tracing::warn!(app = %app, "No healthy backend");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("No available backend for {}", app),
                )
                    .into_response()
            }
            SelectOutcome::Selected(addr) => self.forward(req, &app, &addr).await,
        }
    }

    /// Stream the request to the selected backend and its response back.
    ///
    /// Neither body is buffered. A connection failure after selection is a
    /// 500 to the caller; we never retry against a second backend.
    async fn forward(&self, req: Request<Body>, app: &str, addr: &str) -> Response {
        let (parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let backend_url = format!("http://{}{}", addr, path_and_query);

        tracing::debug!(
            app = %app,
            backend = %addr,
            method = %parts.method,
            path = %path_and_query,
            "Forwarding request"
        );

        let mut backend_req = self
            .state
            .http_client
            .request(parts.method, &backend_url);

        // Forward headers as-is, including the original Host for virtual
        // hosting on the backend. Content-Length is dropped since the body
        // is re-framed as a stream.
        for (name, value) in parts.headers.iter() {
            if name == header::CONTENT_LENGTH {
                continue;
            }
            backend_req = backend_req.header(name, value);
        }

        backend_req = backend_req.body(reqwest::Body::wrap_stream(body.into_data_stream()));

        let backend_response = match backend_req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(app = %app, backend = %addr, error = %e, "Backend request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response();
            }
        };

        let status = backend_response.status();
        let headers = backend_response.headers().clone();

        let mut response = Response::builder().status(status);
        for (name, value) in headers.iter() {
            // Axum recomputes framing for the streamed body.
            if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
                continue;
            }
            response = response.header(name, value);
        }

        response
            .body(Body::from_stream(backend_response.bytes_stream()))
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to assemble proxied response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}
