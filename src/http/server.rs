//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use tracing::{error, info};

use super::middleware::admission_middleware;
use crate::error::Result;
use crate::ratelimit::LimiterSet;

/// HTTP server with the admission middleware installed ahead of all routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The limiter set shared with the middleware
    limiters: Arc<LimiterSet>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, limiters: Arc<LimiterSet>) -> Self {
        Self { addr, limiters }
    }

    /// Build the router.
    ///
    /// The admission middleware wraps every route, including the fallback,
    /// so unmatched paths are still accounted against the caller's quota.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.limiters),
                admission_middleware,
            ))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found" })),
    )
}
