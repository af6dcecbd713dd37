//! MCP protocol handling
//!
//! Dispatches JSON-RPC requests to the toolbox, the resources and the
//! prompts. Transport agnostic; see [`crate::server`] for stdio and HTTP.

pub mod prompts;
pub mod protocol;
pub mod resources;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::identity::DEFAULT_NAMESPACE;
use crate::tools::{ToolOutcome, Toolbox};

use self::prompts::{DiagnoseArgs, DIAGNOSE_PROMPT};
pub use self::protocol::*;
use self::resources::ResourcePath;

pub const SERVER_NAME: &str = "kube-mcp-server";

#[derive(Clone)]
pub struct McpServer {
    toolbox: Arc<Toolbox>,
}

impl McpServer {
    pub fn new(toolbox: Arc<Toolbox>) -> Self {
        Self { toolbox }
    }

    pub fn toolbox(&self) -> &Arc<Toolbox> {
        &self.toolbox
    }

    pub fn server_info() -> Value {
        json!({
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        })
    }

    /// Parse and handle one raw message.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::parse_error(e))
            }
        }
    }

    /// Handle a request. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "Handling MCP request");

        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.clone().map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
                )
            });
        }

        if request.is_notification() {
            debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id;
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),

            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,

            "resources/list" => self.handle_resources_list(id),
            "resources/read" => self.handle_resources_read(id, request.params).await,

            "prompts/list" => self.handle_prompts_list(id),
            "prompts/get" => self.handle_prompts_get(id, request.params).await,

            _ => {
                warn!(method = %request.method, "Unknown method");
                JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                )
            }
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("MCP client initialized");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": false },
                    "prompts": { "listChanged": false }
                },
                "serverInfo": Self::server_info()
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools: Vec<Value> = self
            .toolbox
            .available_tools()
            .iter()
            .map(|kind| {
                json!({
                    "name": kind.name(),
                    "description": kind.description(),
                    "inputSchema": kind.input_schema()
                })
            })
            .collect();

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        #[derive(Debug, Deserialize)]
        struct ToolCallParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }

        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        };

        let outcome = self.toolbox.call_named(&params.name, params.arguments).await;
        JsonRpcResponse::success(id, tool_result(&outcome))
    }

    fn handle_resources_list(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({ "resources": resources::list_available_resources() }),
        )
    }

    async fn handle_resources_read(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        #[derive(Debug, Deserialize)]
        struct ReadParams {
            uri: String,
        }

        let params: ReadParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        };

        let Some(path) = resources::parse_resource_uri(&params.uri) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown resource: {}", params.uri));
        };

        let (mime_type, text) = match path {
            ResourcePath::ClusterInfo => match self.toolbox.cluster_info().await {
                ToolOutcome::Success { output, .. } => ("text/plain", output),
                failure => return resource_failure(id, &failure),
            },
            ResourcePath::Contexts => match self.toolbox.identities().contexts().await {
                Ok(contexts) => (
                    "application/json",
                    serde_json::to_string_pretty(&json!({ "contexts": contexts })).unwrap_or_default(),
                ),
                Err(e) => return resource_failure(id, &ToolOutcome::from(e)),
            },
        };

        JsonRpcResponse::success(
            id,
            json!({
                "contents": [{
                    "uri": params.uri,
                    "mimeType": mime_type,
                    "text": text
                }]
            }),
        )
    }

    fn handle_prompts_list(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "prompts": prompts::list_available_prompts() }))
    }

    async fn handle_prompts_get(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        #[derive(Debug, Deserialize)]
        struct GetPromptParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }

        let params: GetPromptParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        };
        if params.name != DIAGNOSE_PROMPT {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown prompt: {}", params.name));
        }

        let args: DiagnoseArgs = match serde_json::from_value(params.arguments) {
            Ok(args) => args,
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid arguments: {}", e)),
        };

        let namespace = match self.toolbox.identities().snapshot().await {
            Ok(identity) => identity.namespace.clone(),
            Err(_) => DEFAULT_NAMESPACE.to_string(),
        };

        match prompts::render_diagnose(&args, &namespace) {
            Ok(text) => JsonRpcResponse::success(
                id,
                json!({
                    "description": format!("Troubleshooting guide for {}", args.keyword.trim()),
                    "messages": [{
                        "role": "user",
                        "content": { "type": "text", "text": text }
                    }]
                }),
            ),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }
}

/// MCP tool result; failures are results with `isError`, not protocol errors.
fn tool_result(outcome: &ToolOutcome) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": outcome.to_text()
        }],
        "isError": outcome.is_error()
    })
}

fn resource_failure(id: Option<Value>, outcome: &ToolOutcome) -> JsonRpcResponse {
    let data = serde_json::to_value(outcome).unwrap_or_default();
    let message = match outcome {
        ToolOutcome::Error { error, .. } => error.clone(),
        ToolOutcome::Success { .. } => "Resource unavailable".to_string(),
    };
    JsonRpcResponse::error_with_data(id, INTERNAL_ERROR, message, data)
}
