//! Prompt templates
//!
//! Prompts are Tera templates rendered with the caller's arguments.

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::{Error, Result};

pub const DIAGNOSE_PROMPT: &str = "k8s_diagnose";

const DIAGNOSE_TEMPLATE: &str = r#"# Kubernetes troubleshooting

Goal: diagnose problems related to "{{ keyword }}" in namespace "{{ namespace }}".

## 1. Cluster basics
- Check the control plane with the `ping` tool.
- List nodes with `kubectl_get` (resource_type: nodes, output: wide).

## 2. Workload state
- List pods, services and deployments in "{{ namespace }}" with `kubectl_get` and look for names containing "{{ keyword }}".
- Use label_selector when the workload is labelled, e.g. app={{ keyword }}.

## 3. Details
- Describe suspicious pods with `kubectl_describe`.
- Read container logs with `kubectl_logs` (set previous: true for crash loops).
- List recent events with `kubectl_get` (resource_type: events, namespace: {{ namespace }}); they are sorted by last timestamp.

## 4. Networking
- Check service endpoints with `kubectl_get` (resource_type: endpoints).
- Check network policies with `kubectl_get` (resource_type: networkpolicies).
{% if rollout %}
## 5. Rollouts
- Inspect rollout status and history with `kubectl_rollout` (sub_command: status, history).
- Roll back with `kubectl_rollout` (sub_command: undo) if a recent revision broke "{{ keyword }}".
{% endif %}
## Common causes
1. Pod not starting: image name, resource limits, volume mounts.
2. Service unreachable: selector labels, ports, network policies.
3. Crash loops: application logs, configuration, health probes.
"#;

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

pub fn list_available_prompts() -> Vec<PromptInfo> {
    vec![PromptInfo {
        name: DIAGNOSE_PROMPT,
        description: "Step by step troubleshooting guide for a workload",
        arguments: vec![
            PromptArgument {
                name: "keyword",
                description: "Name or fragment of the workload to investigate",
                required: true,
            },
            PromptArgument {
                name: "namespace",
                description: "Namespace to investigate; defaults to the active namespace",
                required: false,
            },
        ],
    }]
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnoseArgs {
    pub keyword: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Include the rollout section
    #[serde(default = "default_rollout")]
    pub rollout: bool,
}

fn default_rollout() -> bool {
    true
}

/// Render the diagnose prompt; an empty namespace falls back to the active one.
pub fn render_diagnose(args: &DiagnoseArgs, active_namespace: &str) -> Result<String> {
    if args.keyword.trim().is_empty() {
        return Err(Error::Internal("keyword must not be empty".to_string()));
    }

    let namespace = args
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(active_namespace);

    let mut tera = Tera::default();
    tera.add_raw_template(DIAGNOSE_PROMPT, DIAGNOSE_TEMPLATE)?;

    let mut context = Context::new();
    context.insert("keyword", args.keyword.trim());
    context.insert("namespace", namespace);
    context.insert("rollout", &args.rollout);

    Ok(tera.render(DIAGNOSE_PROMPT, &context)?)
}
