//! kubectl tools
//!
//! Parameter types for the kubectl tools and the argument vectors they map to.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{non_empty, require_name, require_positional, Invocation, ToolError};
use crate::executor::OperationClass;
use crate::sanitizer::OutputFormat;

/// Resource types that are not namespaced and never get `-n`.
const CLUSTER_SCOPED: &[&str] = &[
    "nodes",
    "node",
    "no",
    "namespaces",
    "namespace",
    "ns",
    "persistentvolumes",
    "persistentvolume",
    "pv",
    "storageclasses",
    "storageclass",
    "sc",
    "clusterroles",
    "clusterrole",
    "clusterrolebindings",
    "clusterrolebinding",
    "customresourcedefinitions",
    "customresourcedefinition",
    "crd",
    "crds",
];

fn is_cluster_scoped(resource_type: &str) -> bool {
    CLUSTER_SCOPED.contains(&resource_type)
}

fn scope_args(
    resource_type: &str,
    namespace: Option<&str>,
    default_namespace: &str,
    all_namespaces: bool,
) -> Result<Vec<String>, ToolError> {
    if all_namespaces {
        return Ok(vec!["--all-namespaces".to_string()]);
    }
    match namespace {
        Some(ns) => {
            require_name("namespace", ns)?;
            Ok(vec!["-n".to_string(), ns.to_string()])
        }
        None if is_cluster_scoped(resource_type) => Ok(Vec::new()),
        None => Ok(vec!["-n".to_string(), default_namespace.to_string()]),
    }
}

// Manifests may carry their own namespace, so only an explicit one is passed.
fn explicit_namespace(namespace: Option<&str>) -> Result<Vec<String>, ToolError> {
    match namespace {
        Some(ns) => {
            require_name("namespace", ns)?;
            Ok(vec!["-n".to_string(), ns.to_string()])
        }
        None => Ok(Vec::new()),
    }
}

fn resource_ref(resource_type: &str, name: &str) -> Result<String, ToolError> {
    require_name("resource_type", resource_type)?;
    require_name("name", name)?;
    Ok(format!("{}/{}", resource_type, name))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GetOutput {
    #[default]
    Json,
    Yaml,
    Wide,
    Name,
}

impl GetOutput {
    pub fn as_str(&self) -> &'static str {
        match self {
            GetOutput::Json => "json",
            GetOutput::Yaml => "yaml",
            GetOutput::Wide => "wide",
            GetOutput::Name => "name",
        }
    }
}

/// Get or list Kubernetes resources
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetParams {
    /// Resource type, e.g. pods, deployments, services, secrets, events
    pub resource_type: String,
    /// Resource name; omit to list
    #[serde(default)]
    pub name: Option<String>,
    /// Namespace; defaults to the active namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// Output format
    #[serde(default)]
    pub output: GetOutput,
    /// List across all namespaces
    #[serde(default)]
    pub all_namespaces: bool,
    /// Label selector, e.g. app=web
    #[serde(default)]
    pub label_selector: Option<String>,
    /// Field selector, e.g. status.phase=Running
    #[serde(default)]
    pub field_selector: Option<String>,
    /// Field path to sort by, e.g. metadata.creationTimestamp
    #[serde(default)]
    pub sort_by: Option<String>,
}

impl GetParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        require_name("resource_type", &resource_type)?;

        let mut args = vec!["get".to_string(), resource_type.clone()];
        if let Some(name) = non_empty(&self.name) {
            require_name("name", name)?;
            args.push(name.to_string());
        }
        args.extend(scope_args(
            &resource_type,
            non_empty(&self.namespace),
            default_namespace,
            self.all_namespaces,
        )?);

        if let Some(selector) = non_empty(&self.label_selector) {
            args.push(format!("--selector={}", selector));
        }
        if let Some(selector) = non_empty(&self.field_selector) {
            args.push(format!("--field-selector={}", selector));
        }

        match non_empty(&self.sort_by) {
            Some(path) if path.starts_with('.') || path.starts_with('{') => {
                args.push(format!("--sort-by={}", path))
            }
            Some(path) => args.push(format!("--sort-by=.{}", path)),
            None if resource_type == "events" || resource_type == "event" => {
                args.push("--sort-by=.lastTimestamp".to_string())
            }
            None => {}
        }

        args.push("-o".to_string());
        args.push(self.output.as_str().to_string());

        Ok(Invocation::kubectl(OperationClass::Read, args)
            .with_format(OutputFormat::from_output_flag(self.output.as_str())))
    }
}

/// Show details of a resource or group of resources
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DescribeParams {
    /// Resource type, e.g. pod, deployment, node
    pub resource_type: String,
    /// Resource name; omit to describe all of the type
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl DescribeParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        require_name("resource_type", &resource_type)?;

        let mut args = vec!["describe".to_string(), resource_type.clone()];
        if let Some(name) = non_empty(&self.name) {
            require_name("name", name)?;
            args.push(name.to_string());
        }
        args.extend(scope_args(
            &resource_type,
            non_empty(&self.namespace),
            default_namespace,
            false,
        )?);

        Ok(Invocation::kubectl(OperationClass::Read, args))
    }
}

/// Apply a manifest to the cluster
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ApplyParams {
    /// YAML or JSON manifest content
    #[serde(default)]
    pub manifest: Option<String>,
    /// Path of a manifest file readable by the server
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Client-side dry run
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
}

impl ApplyParams {
    pub fn invocation(&self) -> Result<Invocation, ToolError> {
        let mut args = vec!["apply".to_string(), "-f".to_string()];
        let stdin = match (non_empty(&self.manifest), non_empty(&self.filename)) {
            (Some(manifest), None) => {
                args.push("-".to_string());
                Some(manifest.to_string())
            }
            (None, Some(filename)) => {
                require_positional("filename", filename)?;
                args.push(filename.to_string());
                None
            }
            (Some(_), Some(_)) => {
                return Err(ToolError::InvalidParams(
                    "provide either manifest or filename, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(ToolError::InvalidParams(
                    "one of manifest or filename is required".to_string(),
                ))
            }
        };

        args.extend(explicit_namespace(non_empty(&self.namespace))?);
        if self.dry_run {
            args.push("--dry-run=client".to_string());
        }
        if self.force {
            args.push("--force".to_string());
        }

        let invocation = Invocation::kubectl(OperationClass::Write, args);
        Ok(match stdin {
            Some(manifest) => invocation.with_stdin(manifest),
            None => invocation,
        })
    }
}

/// Delete resources by type and name, selector, manifest or file
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DeleteParams {
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub label_selector: Option<String>,
    /// YAML or JSON manifest of the resources to delete
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub all_namespaces: bool,
    #[serde(default)]
    pub force: bool,
    /// Seconds given to the resource to terminate gracefully
    #[serde(default)]
    pub grace_period_seconds: Option<u32>,
}

impl DeleteParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let mut args = vec!["delete".to_string()];
        let mut stdin = None;

        match (
            non_empty(&self.manifest),
            non_empty(&self.filename),
            non_empty(&self.resource_type),
        ) {
            (Some(manifest), None, None) => {
                args.extend(["-f".to_string(), "-".to_string()]);
                args.extend(explicit_namespace(non_empty(&self.namespace))?);
                stdin = Some(manifest.to_string());
            }
            (None, Some(filename), None) => {
                require_positional("filename", filename)?;
                args.extend(["-f".to_string(), filename.to_string()]);
                args.extend(explicit_namespace(non_empty(&self.namespace))?);
            }
            (None, None, Some(resource_type)) => {
                let resource_type = resource_type.to_lowercase();
                require_name("resource_type", &resource_type)?;
                args.push(resource_type.clone());

                let name = non_empty(&self.name);
                let selector = non_empty(&self.label_selector);
                if name.is_none() && selector.is_none() {
                    return Err(ToolError::InvalidParams(
                        "deleting by resource_type requires name or label_selector".to_string(),
                    ));
                }
                if let Some(name) = name {
                    require_name("name", name)?;
                    args.push(name.to_string());
                }
                args.extend(scope_args(
                    &resource_type,
                    non_empty(&self.namespace),
                    default_namespace,
                    self.all_namespaces,
                )?);
                if let Some(selector) = selector {
                    args.push(format!("--selector={}", selector));
                }
            }
            (None, None, None) => {
                return Err(ToolError::InvalidParams(
                    "one of resource_type, manifest or filename is required".to_string(),
                ))
            }
            _ => {
                return Err(ToolError::InvalidParams(
                    "resource_type, manifest and filename are mutually exclusive".to_string(),
                ))
            }
        }

        if self.force {
            args.push("--force".to_string());
        }
        if let Some(seconds) = self.grace_period_seconds {
            args.push(format!("--grace-period={}", seconds));
        }

        let invocation = Invocation::kubectl(OperationClass::Write, args);
        Ok(match stdin {
            Some(manifest) => invocation.with_stdin(manifest),
            None => invocation,
        })
    }
}

fn default_logs_resource() -> String {
    "pod".to_string()
}

/// Print the logs of a container
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LogsParams {
    /// Resource type: pod, deployment, job, ...
    #[serde(default = "default_logs_resource")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    /// Number of most recent lines to show
    #[serde(default)]
    pub tail: Option<u32>,
    /// Only logs newer than a relative duration like 5s, 2m or 3h
    #[serde(default)]
    pub since: Option<String>,
    /// Only logs after an RFC3339 timestamp
    #[serde(default)]
    pub since_time: Option<String>,
    #[serde(default)]
    pub timestamps: bool,
    /// Logs of the previous terminated container
    #[serde(default)]
    pub previous: bool,
    #[serde(default)]
    pub label_selector: Option<String>,
}

impl LogsParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        let namespace = non_empty(&self.namespace).unwrap_or(default_namespace);
        require_name("namespace", namespace)?;

        let mut args = vec![
            "logs".to_string(),
            resource_ref(&resource_type, &self.name)?,
            "-n".to_string(),
            namespace.to_string(),
        ];
        if let Some(tail) = self.tail {
            args.push(format!("--tail={}", tail));
        }
        if let Some(container) = non_empty(&self.container) {
            require_name("container", container)?;
            args.push(format!("--container={}", container));
        }
        if let Some(since) = non_empty(&self.since) {
            args.push(format!("--since={}", since));
        }
        if let Some(since_time) = non_empty(&self.since_time) {
            let since_time = DateTime::parse_from_rfc3339(since_time).map_err(|e| {
                ToolError::InvalidParams(format!("since_time '{}' is not an RFC3339 timestamp: {}", since_time, e))
            })?;
            args.push(format!(
                "--since-time={}",
                since_time.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        if self.timestamps {
            args.push("--timestamps".to_string());
        }
        if self.previous {
            args.push("--previous".to_string());
        }
        if let Some(selector) = non_empty(&self.label_selector) {
            args.push(format!("--selector={}", selector));
        }

        Ok(Invocation::kubectl(OperationClass::Read, args))
    }
}

fn default_scale_resource() -> String {
    "deployment".to_string()
}

/// Scale a deployment, replicaset or statefulset
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ScaleParams {
    pub name: String,
    pub replicas: u32,
    #[serde(default = "default_scale_resource")]
    pub resource_type: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ScaleParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        let mut args = vec![
            "scale".to_string(),
            resource_ref(&resource_type, &self.name)?,
            format!("--replicas={}", self.replicas),
        ];
        args.extend(scope_args(&resource_type, non_empty(&self.namespace), default_namespace, false)?);

        Ok(Invocation::kubectl(OperationClass::Write, args))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    #[default]
    Strategic,
    Merge,
    Json,
}

impl PatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchType::Strategic => "strategic",
            PatchType::Merge => "merge",
            PatchType::Json => "json",
        }
    }
}

/// Update fields of a resource with a patch
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PatchParams {
    pub resource_type: String,
    pub name: String,
    /// Patch document as a JSON string
    pub patch_data: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub patch_type: PatchType,
    #[serde(default)]
    pub dry_run: bool,
}

impl PatchParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        serde_json::from_str::<serde_json::Value>(&self.patch_data)
            .map_err(|e| ToolError::InvalidParams(format!("patch_data is not valid JSON: {}", e)))?;

        let mut args = vec!["patch".to_string(), resource_ref(&resource_type, &self.name)?];
        args.extend(scope_args(&resource_type, non_empty(&self.namespace), default_namespace, false)?);
        args.push(format!("--type={}", self.patch_type.as_str()));
        args.push("-p".to_string());
        args.push(self.patch_data.clone());
        if self.dry_run {
            args.push("--dry-run=client".to_string());
        }

        Ok(Invocation::kubectl(OperationClass::Write, args))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RolloutCommand {
    Status,
    History,
    Undo,
    Restart,
    Pause,
    Resume,
}

impl RolloutCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutCommand::Status => "status",
            RolloutCommand::History => "history",
            RolloutCommand::Undo => "undo",
            RolloutCommand::Restart => "restart",
            RolloutCommand::Pause => "pause",
            RolloutCommand::Resume => "resume",
        }
    }
}

fn default_rollout_resource() -> String {
    "deployment".to_string()
}

/// Manage the rollout of a deployment, daemonset or statefulset
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RolloutParams {
    pub sub_command: RolloutCommand,
    pub name: String,
    #[serde(default = "default_rollout_resource")]
    pub resource_type: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Revision to roll back to (undo only)
    #[serde(default)]
    pub revision: Option<u32>,
    /// How long status waits, e.g. 60s
    #[serde(default)]
    pub timeout: Option<String>,
}

impl RolloutParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let resource_type = self.resource_type.to_lowercase();
        let mut args = vec![
            "rollout".to_string(),
            self.sub_command.as_str().to_string(),
            resource_ref(&resource_type, &self.name)?,
        ];
        args.extend(scope_args(&resource_type, non_empty(&self.namespace), default_namespace, false)?);

        if let Some(revision) = self.revision {
            if self.sub_command != RolloutCommand::Undo {
                return Err(ToolError::InvalidParams(
                    "revision is only valid with sub_command undo".to_string(),
                ));
            }
            args.push(format!("--to-revision={}", revision));
        }
        if let Some(timeout) = non_empty(&self.timeout) {
            args.push(format!("--timeout={}", timeout));
        }

        let class = match self.sub_command {
            RolloutCommand::Status | RolloutCommand::History => OperationClass::Read,
            _ => OperationClass::Write,
        };
        Ok(Invocation::kubectl(class, args))
    }
}

/// Command line given either as one whitespace separated string or as a list.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn argv(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandLine::Argv(argv) => argv.clone(),
        }
    }
}

/// Execute a command in a container
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecParams {
    /// Pod name
    pub name: String,
    pub command: CommandLine,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
}

impl ExecParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        require_name("name", &self.name)?;
        let command = self.command.argv();
        if command.is_empty() {
            return Err(ToolError::InvalidParams("command must not be empty".to_string()));
        }

        let mut args = vec!["exec".to_string(), self.name.clone()];
        args.extend(scope_args("pods", non_empty(&self.namespace), default_namespace, false)?);
        if let Some(container) = non_empty(&self.container) {
            require_name("container", container)?;
            args.push(format!("--container={}", container));
        }
        args.push("--".to_string());
        args.extend(command);

        Ok(Invocation::kubectl(OperationClass::Write, args))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContextOperation {
    #[default]
    List,
    Get,
    Set,
}

/// List, show or switch the active cluster context
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ContextParams {
    #[serde(default)]
    pub operation: ContextOperation,
    /// Context to switch to (set only)
    #[serde(default)]
    pub name: Option<String>,
    /// Namespace to make active (set only)
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ContextParams {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.operation != ContextOperation::Set {
            return Ok(());
        }
        match (non_empty(&self.name), non_empty(&self.namespace)) {
            (None, None) => Err(ToolError::InvalidParams(
                "set requires name, namespace or both".to_string(),
            )),
            (_, Some(ns)) => require_name("namespace", ns),
            _ => Ok(()),
        }
    }
}
