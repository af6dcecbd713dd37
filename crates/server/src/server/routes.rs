use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use std::sync::Arc;

use crate::mcp::McpServer;
use crate::metrics::gather_metrics;

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn metrics() -> String {
    gather_metrics()
}

// The body is taken raw so malformed JSON becomes a JSON-RPC parse error
// instead of an axum rejection.
pub async fn mcp(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
