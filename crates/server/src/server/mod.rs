//! Transports
//!
//! The same [`McpServer`] is served either over HTTP (one JSON-RPC message per
//! POST body) or over stdio (one message per line).

mod routes;
mod stdio;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::mcp::McpServer;

pub use stdio::{serve_lines, serve_stdio};

pub struct Server {
    mcp: Arc<McpServer>,
}

impl Server {
    pub fn new(mcp: Arc<McpServer>) -> Self {
        Self { mcp }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health_check))
            .route("/metrics", get(routes::metrics))
            .route("/mcp", post(routes::mcp))
            .route("/", post(routes::mcp))
            .layer(TraceLayer::new_for_http())
            .with_state(self.mcp)
    }

    pub async fn start(self, addr: &str) -> crate::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "HTTP transport listening");
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
