#![cfg(unix)]

use kube_mcp_server::{
    executor::{Deadlines, TIMEOUT_EXIT_CODE},
    identity::IdentityStore,
    tools::FailureKind,
    ProcessRunner, Sanitizer, ToolOutcome, Toolbox,
};
use serde_json::json;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Stands in for kubectl. Arguments arrive as: --kubeconfig <path> <verb> ...
const FAKE_KUBECTL: &str = r#"#!/bin/sh
test -f "$2" || { echo "kubeconfig $2 missing" >&2; exit 9; }
case "$3" in
  get)
    echo "$2" >&2
    cat <<'JSON'
{"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"}, "data": {"password": "cDQkJHc="}}
JSON
    ;;
  logs)
    echo 'Error from server (NotFound): pods "missing" not found' >&2
    exit 1
    ;;
  rollout)
    exec sleep 30
    ;;
esac
"#;

// A single test keeps the script from being executed while another test
// thread still holds it open for writing.
#[tokio::test]
async fn test_process_runner_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let kubectl = dir.path().join("kubectl");
    std::fs::write(&kubectl, FAKE_KUBECTL).unwrap();
    std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755)).unwrap();

    let env: HashMap<String, String> = [("K8S_SERVER", "https://cluster.example:6443"), ("K8S_TOKEN", "abcd")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let deadlines = Deadlines {
        read: Duration::from_secs(1),
        write: Duration::from_secs(1),
        release: Duration::from_secs(1),
    };
    let toolbox = Toolbox::new(
        Arc::new(ProcessRunner::new(&kubectl, dir.path().join("helm"))),
        Arc::new(IdentityStore::initialize(&env)),
        Sanitizer::default(),
        deadlines,
    );

    // Secret data is redacted and the kubeconfig is gone afterwards
    let outcome = toolbox
        .call_named("kubectl_get", json!({"resource_type": "secret", "name": "db"}))
        .await;
    match outcome {
        ToolOutcome::Success { output, stderr } => {
            assert!(!output.contains("cDQkJHc="));
            assert!(output.contains("***"));
            let artifact = Path::new(stderr.trim());
            assert!(artifact.is_absolute());
            assert!(!artifact.exists());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Nonzero exit is a structured failure with the CLI's stderr
    let outcome = toolbox
        .call_named("kubectl_logs", json!({"name": "missing"}))
        .await;
    match outcome {
        ToolOutcome::Error { kind, error, exit_code, timed_out } => {
            assert_eq!(kind, FailureKind::NonZeroExit);
            assert_eq!(exit_code, Some(1));
            assert!(!timed_out);
            assert!(error.contains("NotFound"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // The deadline kills the process
    let started = Instant::now();
    let outcome = toolbox
        .call_named(
            "kubectl_rollout",
            json!({"sub_command": "status", "resource_type": "deployment", "name": "web"}),
        )
        .await;
    assert!(started.elapsed() < Duration::from_secs(10));
    match outcome {
        ToolOutcome::Error { kind, exit_code, timed_out, .. } => {
            assert_eq!(kind, FailureKind::Timeout);
            assert_eq!(exit_code, Some(TIMEOUT_EXIT_CODE));
            assert!(timed_out);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
