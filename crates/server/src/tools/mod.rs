//! Tool Surface
//!
//! The catalog of named operations. Every tool call captures the active
//! identity snapshot, builds its argument vector, runs it against a freshly
//! materialized kubeconfig and sanitizes what comes back. Failures of any
//! stage are returned as a structured [`ToolOutcome`], never raised.

pub mod helm;
pub mod kubectl;

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::credentials::CredentialArtifact;
use crate::executor::{
    Binary, CommandResult, CommandRunner, CommandSpec, Deadlines, ExecutionError, OperationClass,
};
use crate::identity::{ConfigError, ConfigErrorKind, IdentityStore, ResolvedIdentity};
use crate::metrics::TOOL_CALLS_TOTAL;
use crate::sanitizer::{OutputFormat, SanitizationError, Sanitizer};

use self::helm::{InstallParams, ListParams, UninstallParams, UpgradeParams};
use self::kubectl::{
    ApplyParams, ContextOperation, ContextParams, DeleteParams, DescribeParams, ExecParams, GetParams,
    LogsParams, PatchParams, RolloutParams, ScaleParams,
};

lazy_static! {
    static ref NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._:-]*[A-Za-z0-9])?$").expect("name pattern is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool unavailable: {0}")]
    Unavailable(String),
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Resource, namespace, release and container names.
pub(crate) fn require_name(field: &str, value: &str) -> Result<(), ToolError> {
    if NAME_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ToolError::InvalidParams(format!("{} '{}' is not a valid name", field, value)))
    }
}

/// Free-form positional values such as chart references and file paths.
pub(crate) fn require_positional(field: &str, value: &str) -> Result<(), ToolError> {
    if value.is_empty() {
        Err(ToolError::InvalidParams(format!("{} must not be empty", field)))
    } else if value.starts_with('-') {
        Err(ToolError::InvalidParams(format!("{} must not start with '-'", field)))
    } else {
        Ok(())
    }
}

/// The command a tool runs, before deadline and credentials are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub binary: Binary,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub class: OperationClass,
    pub format: OutputFormat,
}

impl Invocation {
    pub fn kubectl(class: OperationClass, args: Vec<String>) -> Self {
        Self::new(Binary::Kubectl, class, args)
    }

    pub fn helm(class: OperationClass, args: Vec<String>) -> Self {
        Self::new(Binary::Helm, class, args)
    }

    fn new(binary: Binary, class: OperationClass, args: Vec<String>) -> Self {
        Self {
            binary,
            args,
            stdin: None,
            class,
            format: OutputFormat::Text,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Parameters of tools that take none.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Ping,
    KubectlGet,
    KubectlDescribe,
    KubectlApply,
    KubectlDelete,
    KubectlLogs,
    KubectlContext,
    KubectlScale,
    KubectlPatch,
    KubectlRollout,
    KubectlExec,
    HelmInstall,
    HelmUpgrade,
    HelmUninstall,
    HelmList,
    HealthCheck,
}

impl ToolKind {
    pub const ALL: [ToolKind; 16] = [
        ToolKind::Ping,
        ToolKind::KubectlGet,
        ToolKind::KubectlDescribe,
        ToolKind::KubectlApply,
        ToolKind::KubectlDelete,
        ToolKind::KubectlLogs,
        ToolKind::KubectlContext,
        ToolKind::KubectlScale,
        ToolKind::KubectlPatch,
        ToolKind::KubectlRollout,
        ToolKind::KubectlExec,
        ToolKind::HelmInstall,
        ToolKind::HelmUpgrade,
        ToolKind::HelmUninstall,
        ToolKind::HelmList,
        ToolKind::HealthCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Ping => "ping",
            ToolKind::KubectlGet => "kubectl_get",
            ToolKind::KubectlDescribe => "kubectl_describe",
            ToolKind::KubectlApply => "kubectl_apply",
            ToolKind::KubectlDelete => "kubectl_delete",
            ToolKind::KubectlLogs => "kubectl_logs",
            ToolKind::KubectlContext => "kubectl_context",
            ToolKind::KubectlScale => "kubectl_scale",
            ToolKind::KubectlPatch => "kubectl_patch",
            ToolKind::KubectlRollout => "kubectl_rollout",
            ToolKind::KubectlExec => "kubectl_exec",
            ToolKind::HelmInstall => "helm_install",
            ToolKind::HelmUpgrade => "helm_upgrade",
            ToolKind::HelmUninstall => "helm_uninstall",
            ToolKind::HelmList => "helm_list",
            ToolKind::HealthCheck => "health_check",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::Ping => "Check connectivity to the cluster (kubectl cluster-info)",
            ToolKind::KubectlGet => "Get or list Kubernetes resources",
            ToolKind::KubectlDescribe => "Show details of a resource or group of resources",
            ToolKind::KubectlApply => "Apply a YAML or JSON manifest to the cluster",
            ToolKind::KubectlDelete => "Delete resources by name, label selector, manifest or file",
            ToolKind::KubectlLogs => "Print the logs of a container in a pod or workload",
            ToolKind::KubectlContext => "List, show or switch the active cluster context and namespace",
            ToolKind::KubectlScale => "Set the replica count of a deployment, replicaset or statefulset",
            ToolKind::KubectlPatch => "Update fields of a resource with a strategic, merge or JSON patch",
            ToolKind::KubectlRollout => "Manage the rollout of a deployment, daemonset or statefulset",
            ToolKind::KubectlExec => "Execute a command in a container",
            ToolKind::HelmInstall => "Install a Helm chart as a new release",
            ToolKind::HelmUpgrade => "Upgrade a Helm release to a new chart version or values",
            ToolKind::HelmUninstall => "Uninstall a Helm release",
            ToolKind::HelmList => "List Helm releases",
            ToolKind::HealthCheck => "Check that the kubectl client is installed and working",
        }
    }

    pub fn input_schema(&self) -> Value {
        let schema = match self {
            ToolKind::Ping | ToolKind::HealthCheck => schemars::schema_for!(NoParams),
            ToolKind::KubectlGet => schemars::schema_for!(GetParams),
            ToolKind::KubectlDescribe => schemars::schema_for!(DescribeParams),
            ToolKind::KubectlApply => schemars::schema_for!(ApplyParams),
            ToolKind::KubectlDelete => schemars::schema_for!(DeleteParams),
            ToolKind::KubectlLogs => schemars::schema_for!(LogsParams),
            ToolKind::KubectlContext => schemars::schema_for!(ContextParams),
            ToolKind::KubectlScale => schemars::schema_for!(ScaleParams),
            ToolKind::KubectlPatch => schemars::schema_for!(PatchParams),
            ToolKind::KubectlRollout => schemars::schema_for!(RolloutParams),
            ToolKind::KubectlExec => schemars::schema_for!(ExecParams),
            ToolKind::HelmInstall => schemars::schema_for!(InstallParams),
            ToolKind::HelmUpgrade => schemars::schema_for!(UpgradeParams),
            ToolKind::HelmUninstall => schemars::schema_for!(UninstallParams),
            ToolKind::HelmList => schemars::schema_for!(ListParams),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }

    pub fn requires_helm(&self) -> bool {
        matches!(
            self,
            ToolKind::HelmInstall | ToolKind::HelmUpgrade | ToolKind::HelmUninstall | ToolKind::HelmList
        )
    }
}

/// A parsed, validated-by-type tool call.
#[derive(Debug, Clone)]
pub enum ToolCall {
    Ping,
    KubectlGet(GetParams),
    KubectlDescribe(DescribeParams),
    KubectlApply(ApplyParams),
    KubectlDelete(DeleteParams),
    KubectlLogs(LogsParams),
    KubectlContext(ContextParams),
    KubectlScale(ScaleParams),
    KubectlPatch(PatchParams),
    KubectlRollout(RolloutParams),
    KubectlExec(ExecParams),
    HelmInstall(InstallParams),
    HelmUpgrade(UpgradeParams),
    HelmUninstall(UninstallParams),
    HelmList(ListParams),
    HealthCheck,
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

impl ToolCall {
    pub fn from_parts(name: &str, arguments: Value) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let arguments = if arguments.is_null() { json!({}) } else { arguments };

        Ok(match kind {
            ToolKind::Ping => ToolCall::Ping,
            ToolKind::KubectlGet => ToolCall::KubectlGet(parse(arguments)?),
            ToolKind::KubectlDescribe => ToolCall::KubectlDescribe(parse(arguments)?),
            ToolKind::KubectlApply => ToolCall::KubectlApply(parse(arguments)?),
            ToolKind::KubectlDelete => ToolCall::KubectlDelete(parse(arguments)?),
            ToolKind::KubectlLogs => ToolCall::KubectlLogs(parse(arguments)?),
            ToolKind::KubectlContext => ToolCall::KubectlContext(parse(arguments)?),
            ToolKind::KubectlScale => ToolCall::KubectlScale(parse(arguments)?),
            ToolKind::KubectlPatch => ToolCall::KubectlPatch(parse(arguments)?),
            ToolKind::KubectlRollout => ToolCall::KubectlRollout(parse(arguments)?),
            ToolKind::KubectlExec => ToolCall::KubectlExec(parse(arguments)?),
            ToolKind::HelmInstall => ToolCall::HelmInstall(parse(arguments)?),
            ToolKind::HelmUpgrade => ToolCall::HelmUpgrade(parse(arguments)?),
            ToolKind::HelmUninstall => ToolCall::HelmUninstall(parse(arguments)?),
            ToolKind::HelmList => ToolCall::HelmList(parse(arguments)?),
            ToolKind::HealthCheck => ToolCall::HealthCheck,
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::Ping => ToolKind::Ping,
            ToolCall::KubectlGet(_) => ToolKind::KubectlGet,
            ToolCall::KubectlDescribe(_) => ToolKind::KubectlDescribe,
            ToolCall::KubectlApply(_) => ToolKind::KubectlApply,
            ToolCall::KubectlDelete(_) => ToolKind::KubectlDelete,
            ToolCall::KubectlLogs(_) => ToolKind::KubectlLogs,
            ToolCall::KubectlContext(_) => ToolKind::KubectlContext,
            ToolCall::KubectlScale(_) => ToolKind::KubectlScale,
            ToolCall::KubectlPatch(_) => ToolKind::KubectlPatch,
            ToolCall::KubectlRollout(_) => ToolKind::KubectlRollout,
            ToolCall::KubectlExec(_) => ToolKind::KubectlExec,
            ToolCall::HelmInstall(_) => ToolKind::HelmInstall,
            ToolCall::HelmUpgrade(_) => ToolKind::HelmUpgrade,
            ToolCall::HelmUninstall(_) => ToolKind::HelmUninstall,
            ToolCall::HelmList(_) => ToolKind::HelmList,
            ToolCall::HealthCheck => ToolKind::HealthCheck,
        }
    }

    /// Command line of a tool that runs against the cluster.
    pub fn invocation(&self, namespace: &str) -> Result<Invocation, ToolError> {
        match self {
            ToolCall::Ping => Ok(Invocation::kubectl(
                OperationClass::Read,
                vec!["cluster-info".to_string()],
            )),
            ToolCall::KubectlGet(params) => params.invocation(namespace),
            ToolCall::KubectlDescribe(params) => params.invocation(namespace),
            ToolCall::KubectlApply(params) => params.invocation(),
            ToolCall::KubectlDelete(params) => params.invocation(namespace),
            ToolCall::KubectlLogs(params) => params.invocation(namespace),
            ToolCall::KubectlScale(params) => params.invocation(namespace),
            ToolCall::KubectlPatch(params) => params.invocation(namespace),
            ToolCall::KubectlRollout(params) => params.invocation(namespace),
            ToolCall::KubectlExec(params) => params.invocation(namespace),
            ToolCall::HelmInstall(params) => params.invocation(namespace),
            ToolCall::HelmUpgrade(params) => params.invocation(namespace),
            ToolCall::HelmUninstall(params) => params.invocation(namespace),
            ToolCall::HelmList(params) => params.invocation(namespace),
            ToolCall::KubectlContext(_) | ToolCall::HealthCheck => Err(ToolError::InvalidParams(format!(
                "{} does not run a cluster command",
                self.kind().name()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConfigMissing,
    ConfigMalformed,
    IncompleteCredential,
    InvalidParams,
    UnknownTool,
    Unavailable,
    BinaryNotFound,
    NonZeroExit,
    Timeout,
    Execution,
    Sanitization,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        output: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        stderr: String,
    },
    Error {
        kind: FailureKind,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        timed_out: bool,
    },
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        ToolOutcome::Success {
            output: output.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            error: error.into(),
            exit_code: None,
            timed_out: false,
        }
    }

    fn json(value: &Value) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(output) => Self::success(output),
            Err(e) => Self::failure(FailureKind::Execution, e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            ToolOutcome::Success { .. } => "success",
            ToolOutcome::Error { .. } => "error",
        }
    }

    /// Text handed back to the caller: the output itself on success, the
    /// structured error as JSON otherwise.
    pub fn to_text(&self) -> String {
        match self {
            ToolOutcome::Success { output, .. } => output.clone(),
            ToolOutcome::Error { error, .. } => {
                serde_json::to_string_pretty(self).unwrap_or_else(|_| error.clone())
            }
        }
    }
}

impl From<ConfigError> for ToolOutcome {
    fn from(err: ConfigError) -> Self {
        let kind = match err.kind {
            ConfigErrorKind::Missing => FailureKind::ConfigMissing,
            ConfigErrorKind::Malformed => FailureKind::ConfigMalformed,
            ConfigErrorKind::IncompleteCredential => FailureKind::IncompleteCredential,
        };
        ToolOutcome::failure(kind, err.to_string())
    }
}

impl From<ToolError> for ToolOutcome {
    fn from(err: ToolError) -> Self {
        let kind = match err {
            ToolError::InvalidParams(_) => FailureKind::InvalidParams,
            ToolError::UnknownTool(_) => FailureKind::UnknownTool,
            ToolError::Unavailable(_) => FailureKind::Unavailable,
        };
        ToolOutcome::failure(kind, err.to_string())
    }
}

impl From<ExecutionError> for ToolOutcome {
    fn from(err: ExecutionError) -> Self {
        let (kind, exit_code, timed_out) = match &err {
            ExecutionError::BinaryNotFound { .. } => (FailureKind::BinaryNotFound, None, false),
            ExecutionError::Timeout { .. } => {
                (FailureKind::Timeout, Some(crate::executor::TIMEOUT_EXIT_CODE), true)
            }
            ExecutionError::NonZeroExit { exit_code, .. } => (FailureKind::NonZeroExit, Some(*exit_code), false),
            _ => (FailureKind::Execution, None, false),
        };
        ToolOutcome::Error {
            kind,
            error: err.to_string(),
            exit_code,
            timed_out,
        }
    }
}

impl From<SanitizationError> for ToolOutcome {
    fn from(err: SanitizationError) -> Self {
        ToolOutcome::failure(FailureKind::Sanitization, err.to_string())
    }
}

/// Check the external binaries before serving.
///
/// kubectl is required. Returns whether helm is usable.
pub async fn check_dependencies(runner: &dyn CommandRunner, deadlines: &Deadlines) -> crate::Result<bool> {
    let kubectl = runner
        .execute(
            CommandSpec::new(
                Binary::Kubectl,
                vec!["version".to_string(), "--client".to_string()],
                deadlines.read,
            ),
            None,
        )
        .await?;
    if !kubectl.success() {
        return Err(crate::Error::Dependency(format!(
            "kubectl version --client failed: {}",
            kubectl.stderr_text().trim()
        )));
    }

    let helm = runner
        .execute(
            CommandSpec::new(
                Binary::Helm,
                vec!["version".to_string(), "--short".to_string()],
                deadlines.read,
            ),
            None,
        )
        .await;
    match helm {
        Ok(result) if result.success() => Ok(true),
        Ok(result) => {
            warn!(stderr = %result.stderr_text().trim(), "helm is not working, helm tools are disabled");
            Ok(false)
        }
        Err(e) => {
            warn!(error = %e, "helm is not available, helm tools are disabled");
            Ok(false)
        }
    }
}

pub struct Toolbox {
    runner: Arc<dyn CommandRunner>,
    identities: Arc<IdentityStore>,
    sanitizer: Sanitizer,
    deadlines: Deadlines,
    helm_enabled: bool,
}

impl Toolbox {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        identities: Arc<IdentityStore>,
        sanitizer: Sanitizer,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            runner,
            identities,
            sanitizer,
            deadlines,
            helm_enabled: true,
        }
    }

    pub fn with_helm(mut self, enabled: bool) -> Self {
        self.helm_enabled = enabled;
        self
    }

    pub fn helm_enabled(&self) -> bool {
        self.helm_enabled
    }

    pub fn identities(&self) -> &Arc<IdentityStore> {
        &self.identities
    }

    pub fn available_tools(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.helm_enabled || !kind.requires_helm())
            .collect()
    }

    /// Parse and run a call given by name.
    pub async fn call_named(&self, name: &str, arguments: Value) -> ToolOutcome {
        match ToolCall::from_parts(name, arguments) {
            Ok(call) => self.call(call).await,
            Err(e) => {
                let label = ToolKind::from_name(name).map(|k| k.name()).unwrap_or("unknown");
                TOOL_CALLS_TOTAL.with_label_values(&[label, "error"]).inc();
                warn!(tool = name, error = %e, "Rejected tool call");
                e.into()
            }
        }
    }

    pub async fn call(&self, call: ToolCall) -> ToolOutcome {
        let kind = call.kind();
        let span = info_span!("tool_call", tool = kind.name(), call_id = %Uuid::new_v4());

        let outcome = self.dispatch(call).instrument(span.clone()).await;

        TOOL_CALLS_TOTAL.with_label_values(&[kind.name(), outcome.status()]).inc();
        span.in_scope(|| match &outcome {
            ToolOutcome::Success { .. } => info!("Tool call succeeded"),
            ToolOutcome::Error { kind, error, .. } => warn!(?kind, %error, "Tool call failed"),
        });
        outcome
    }

    async fn dispatch(&self, call: ToolCall) -> ToolOutcome {
        if call.kind().requires_helm() && !self.helm_enabled {
            return ToolError::Unavailable(format!(
                "{} requires helm, which is not installed or not working",
                call.kind().name()
            ))
            .into();
        }

        match call {
            ToolCall::KubectlContext(params) => self.context(params).await,
            ToolCall::HealthCheck => self.health_check().await,
            other => {
                // captured once; a concurrent context switch does not affect this call
                let identity = match self.identities.snapshot().await {
                    Ok(identity) => identity,
                    Err(e) => return e.into(),
                };
                match other.invocation(&identity.namespace) {
                    Ok(invocation) => self.run(&identity, invocation).await,
                    Err(e) => e.into(),
                }
            }
        }
    }

    /// Run an invocation against an identity and classify the result.
    pub async fn run(&self, identity: &ResolvedIdentity, invocation: Invocation) -> ToolOutcome {
        let artifact = match CredentialArtifact::materialize(identity) {
            Ok(artifact) => artifact,
            Err(e) => return e.into(),
        };

        let binary = invocation.binary;
        let format = invocation.format;
        let timeout = self.deadlines.for_class(invocation.class);
        let mut spec = CommandSpec::new(binary, invocation.args, timeout);
        spec.stdin = invocation.stdin;

        info!(
            binary = %binary,
            args = ?spec.args,
            context = identity.context.as_deref().unwrap_or("<none>"),
            namespace = %identity.namespace,
            "Running command"
        );

        match self.runner.execute(spec, Some(artifact)).await {
            Ok(result) => self.classify(binary, timeout, format, result),
            Err(e) => e.into(),
        }
    }

    fn classify(
        &self,
        binary: Binary,
        timeout: Duration,
        format: OutputFormat,
        result: CommandResult,
    ) -> ToolOutcome {
        if result.timed_out {
            let mut outcome: ToolOutcome = ExecutionError::Timeout { binary, timeout }.into();
            if let ToolOutcome::Error { exit_code, .. } = &mut outcome {
                *exit_code = Some(result.exit_code);
            }
            return outcome;
        }

        if result.exit_code != 0 {
            return ExecutionError::NonZeroExit {
                binary,
                exit_code: result.exit_code,
                stderr: result.stderr_text().trim().to_string(),
            }
            .into();
        }

        match self.sanitizer.sanitize(&result.stdout_text(), format) {
            Ok(output) => ToolOutcome::Success {
                output,
                stderr: result.stderr_text().trim().to_string(),
            },
            Err(e) => e.into(),
        }
    }

    async fn context(&self, params: ContextParams) -> ToolOutcome {
        if let Err(e) = params.validate() {
            return e.into();
        }

        let result = match params.operation {
            ContextOperation::List => self
                .identities
                .contexts()
                .await
                .map(|contexts| json!({ "contexts": contexts })),
            ContextOperation::Get => self.identities.snapshot().await.map(|i| describe_identity(&i)),
            ContextOperation::Set => self
                .identities
                .switch(non_empty(&params.name), non_empty(&params.namespace))
                .await
                .map(|i| describe_identity(&i)),
        };

        match result {
            Ok(value) => ToolOutcome::json(&value),
            Err(e) => e.into(),
        }
    }

    async fn health_check(&self) -> ToolOutcome {
        let spec = CommandSpec::new(
            Binary::Kubectl,
            vec!["version".to_string(), "--client".to_string(), "--output=json".to_string()],
            self.deadlines.read,
        );
        let outcome = match self.runner.execute(spec, None).await {
            Ok(result) => self.classify(Binary::Kubectl, self.deadlines.read, OutputFormat::Json, result),
            Err(e) => e.into(),
        };

        match outcome {
            ToolOutcome::Success { output, .. } => {
                let kubectl = serde_json::from_str::<Value>(&output).unwrap_or(Value::String(output));
                ToolOutcome::json(&json!({
                    "healthy": true,
                    "kubectl": kubectl,
                    "helm_enabled": self.helm_enabled,
                }))
            }
            failure => failure,
        }
    }

    /// Output of `kubectl cluster-info` for the active identity.
    pub async fn cluster_info(&self) -> ToolOutcome {
        self.call(ToolCall::Ping).await
    }
}

fn describe_identity(identity: &ResolvedIdentity) -> Value {
    json!({
        "context": identity.context,
        "namespace": identity.namespace,
        "server": identity.server.as_str(),
        "source": identity.source,
    })
}
