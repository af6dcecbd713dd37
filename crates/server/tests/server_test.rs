use async_trait::async_trait;
use axum::http::StatusCode;
use kube_mcp_server::{
    executor::{CommandResult, CommandRunner, CommandSpec, Deadlines, ExecutionError},
    identity::IdentityStore,
    mcp::McpServer,
    metrics::register_metrics,
    server::Server,
    CredentialArtifact, Sanitizer, Toolbox,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every command and the kubeconfig it was given, then answers with
/// canned kubectl output.
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<(Vec<String>, Option<PathBuf>, Option<String>)>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn execute(
        &self,
        spec: CommandSpec,
        artifact: Option<CredentialArtifact>,
    ) -> Result<CommandResult, ExecutionError> {
        let path = artifact.as_ref().map(|a| a.path().to_path_buf());
        let kubeconfig = path.as_ref().map(|p| std::fs::read_to_string(p).unwrap());
        self.calls.lock().unwrap().push((spec.args.clone(), path, kubeconfig));

        let stdout = match spec.args.first().map(String::as_str) {
            Some("get") => json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [{
                    "apiVersion": "v1",
                    "kind": "Secret",
                    "metadata": {"name": "db", "namespace": "default"},
                    "data": {"password": "cDQkJHc="}
                }]
            })
            .to_string(),
            _ => String::new(),
        };
        Ok(CommandResult {
            exit_code: 0,
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
            duration: Duration::from_millis(5),
            timed_out: false,
        })
    }
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn client(runner: Arc<RecordingRunner>, env: HashMap<String, String>) -> axum_test::TestServer {
    register_metrics();
    let toolbox = Toolbox::new(
        runner,
        Arc::new(IdentityStore::initialize(&env)),
        Sanitizer::default(),
        Deadlines::default(),
    )
    .with_helm(false);
    let app = Server::new(Arc::new(McpServer::new(Arc::new(toolbox)))).build_router();
    axum_test::TestServer::new(app).unwrap()
}

fn minimal_env() -> HashMap<String, String> {
    env(&[("K8S_SERVER", "https://cluster.example:6443"), ("K8S_TOKEN", "abcd")])
}

async fn rpc(client: &axum_test::TestServer, id: i64, method: &str, params: Value) -> Value {
    let response = client
        .post("/mcp")
        .json(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

#[tokio::test]
async fn test_health_and_initialize() {
    let client = client(Arc::new(RecordingRunner::default()), minimal_env());

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");

    let body = rpc(&client, 1, "initialize", json!({"protocolVersion": "2024-11-05"})).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "kube-mcp-server");
    assert!(body["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_get_secrets_is_redacted_and_credentials_are_scoped() {
    let runner = Arc::new(RecordingRunner::default());
    let client = client(runner.clone(), minimal_env());

    let body = rpc(
        &client,
        2,
        "tools/call",
        json!({"name": "kubectl_get", "arguments": {"resource_type": "secrets"}}),
    )
    .await;

    assert_eq!(body["result"]["isError"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(!text.contains("cDQkJHc="));
    assert!(text.contains("***"));

    let calls = runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (args, path, kubeconfig) = &calls[0];
    assert_eq!(args, &["get", "secrets", "-n", "default", "-o", "json"]);

    let kubeconfig = kubeconfig.as_deref().unwrap();
    assert!(kubeconfig.contains("https://cluster.example:6443"));
    assert!(kubeconfig.contains("abcd"));
    assert!(!path.as_ref().unwrap().exists());
}

#[tokio::test]
async fn test_missing_configuration_is_a_tool_error() {
    let runner = Arc::new(RecordingRunner::default());
    let client = client(runner.clone(), env(&[("KUBECONFIG_PATH", "/nonexistent/kubeconfig")]));

    let body = rpc(
        &client,
        3,
        "tools/call",
        json!({"name": "kubectl_get", "arguments": {"resource_type": "pods"}}),
    )
    .await;

    assert_eq!(body["result"]["isError"], true);
    let payload: Value = serde_json::from_str(body["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["kind"], "config_malformed");
    assert!(runner.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_helm_tools_are_hidden_and_rejected_without_helm() {
    let client = client(Arc::new(RecordingRunner::default()), minimal_env());

    let body = rpc(&client, 4, "tools/list", json!({})).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().all(|t| !t["name"].as_str().unwrap().starts_with("helm_")));

    let body = rpc(
        &client,
        5,
        "tools/call",
        json!({"name": "helm_list", "arguments": {}}),
    )
    .await;
    assert_eq!(body["result"]["isError"], true);
    let payload: Value = serde_json::from_str(body["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["kind"], "unavailable");
}

#[tokio::test]
async fn test_context_switch_applies_to_later_calls() {
    let kubeconfig = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://dev.example:6443
- name: prod
  cluster:
    server: https://prod.example:6443
users:
- name: dev
  user:
    token: dev-token
- name: prod
  user:
    token: prod-token
contexts:
- name: dev
  context: {cluster: dev, user: dev, namespace: sandbox}
- name: prod
  context: {cluster: prod, user: prod}
"#;
    let runner = Arc::new(RecordingRunner::default());
    let client = client(runner.clone(), env(&[("KUBECONFIG_YAML", kubeconfig)]));

    let body = rpc(
        &client,
        6,
        "tools/call",
        json!({"name": "kubectl_context", "arguments": {"operation": "set", "name": "prod", "namespace": "shop"}}),
    )
    .await;
    assert_eq!(body["result"]["isError"], false);

    rpc(
        &client,
        7,
        "tools/call",
        json!({"name": "kubectl_describe", "arguments": {"resource_type": "pod", "name": "web-1"}}),
    )
    .await;

    let calls = runner.calls.lock().unwrap();
    let (args, _, kubeconfig) = calls.last().unwrap();
    assert_eq!(args, &["describe", "pod", "web-1", "-n", "shop"]);
    assert!(kubeconfig.as_deref().unwrap().contains("https://prod.example:6443"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let client = client(Arc::new(RecordingRunner::default()), minimal_env());
    rpc(&client, 8, "tools/call", json!({"name": "no_such_tool", "arguments": {}})).await;

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("kube_mcp_tool_calls_total"));
}
