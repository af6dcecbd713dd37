//! helm tools

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, require_name, require_positional, Invocation, ToolError};
use crate::executor::OperationClass;
use crate::sanitizer::OutputFormat;

fn default_true() -> bool {
    true
}

fn namespace_args(namespace: Option<&str>, default_namespace: &str) -> Result<Vec<String>, ToolError> {
    let namespace = namespace.unwrap_or(default_namespace);
    require_name("namespace", namespace)?;
    Ok(vec!["--namespace".to_string(), namespace.to_string()])
}

/// Chart source and values shared by install and upgrade.
fn chart_args(
    args: &mut Vec<String>,
    repo: Option<&str>,
    version: Option<&str>,
    values: &BTreeMap<String, Value>,
) -> Result<Option<String>, ToolError> {
    if let Some(repo) = repo {
        require_positional("repo", repo)?;
        args.push(format!("--repo={}", repo));
    }
    if let Some(version) = version {
        args.push(format!("--version={}", version));
    }
    if values.is_empty() {
        return Ok(None);
    }

    let rendered = serde_yaml::to_string(values)
        .map_err(|e| ToolError::InvalidParams(format!("values cannot be rendered as YAML: {}", e)))?;
    args.extend(["-f".to_string(), "-".to_string()]);
    Ok(Some(rendered))
}

/// Install a Helm chart as a new release
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct InstallParams {
    /// Release name
    pub name: String,
    /// Chart reference, e.g. bitnami/nginx, oci://registry/chart or a local path
    pub chart: String,
    /// Chart repository URL
    #[serde(default)]
    pub repo: Option<String>,
    /// Chart version constraint
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Values overriding the chart defaults
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default = "default_true")]
    pub create_namespace: bool,
}

impl InstallParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        require_name("name", &self.name)?;
        require_positional("chart", &self.chart)?;

        let mut args = vec!["install".to_string(), self.name.clone(), self.chart.clone()];
        args.extend(namespace_args(non_empty(&self.namespace), default_namespace)?);
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        let values = chart_args(&mut args, non_empty(&self.repo), non_empty(&self.version), &self.values)?;

        let invocation = Invocation::helm(OperationClass::Release, args);
        Ok(match values {
            Some(values) => invocation.with_stdin(values),
            None => invocation,
        })
    }
}

/// Upgrade an existing Helm release
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UpgradeParams {
    pub name: String,
    pub chart: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Install the release if it does not exist yet
    #[serde(default)]
    pub install: bool,
}

impl UpgradeParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        require_name("name", &self.name)?;
        require_positional("chart", &self.chart)?;

        let mut args = vec!["upgrade".to_string(), self.name.clone(), self.chart.clone()];
        args.extend(namespace_args(non_empty(&self.namespace), default_namespace)?);
        if self.install {
            args.push("--install".to_string());
        }
        let values = chart_args(&mut args, non_empty(&self.repo), non_empty(&self.version), &self.values)?;

        let invocation = Invocation::helm(OperationClass::Release, args);
        Ok(match values {
            Some(values) => invocation.with_stdin(values),
            None => invocation,
        })
    }
}

/// Uninstall a Helm release
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UninstallParams {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl UninstallParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        require_name("name", &self.name)?;
        let mut args = vec!["uninstall".to_string(), self.name.clone()];
        args.extend(namespace_args(non_empty(&self.namespace), default_namespace)?);
        Ok(Invocation::helm(OperationClass::Write, args))
    }
}

/// List Helm releases
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListParams {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub all_namespaces: bool,
}

impl ListParams {
    pub fn invocation(&self, default_namespace: &str) -> Result<Invocation, ToolError> {
        let mut args = vec!["list".to_string(), "--output".to_string(), "json".to_string()];
        if self.all_namespaces {
            args.push("--all-namespaces".to_string());
        } else {
            args.extend(namespace_args(non_empty(&self.namespace), default_namespace)?);
        }
        Ok(Invocation::helm(OperationClass::Read, args).with_format(OutputFormat::Json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Binary;

    fn args(invocation: &Invocation) -> Vec<&str> {
        invocation.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_install_with_repo_and_values() {
        let params: InstallParams = serde_json::from_value(serde_json::json!({
            "name": "web",
            "chart": "nginx",
            "repo": "https://charts.bitnami.com/bitnami",
            "version": "15.0.0",
            "values": {"replicaCount": 2, "service": {"type": "ClusterIP"}}
        }))
        .unwrap();
        let invocation = params.invocation("apps").unwrap();

        assert_eq!(invocation.binary, Binary::Helm);
        assert_eq!(invocation.class, OperationClass::Release);
        assert_eq!(
            args(&invocation),
            vec![
                "install",
                "web",
                "nginx",
                "--namespace",
                "apps",
                "--create-namespace",
                "--repo=https://charts.bitnami.com/bitnami",
                "--version=15.0.0",
                "-f",
                "-"
            ]
        );

        let values: Value = serde_yaml::from_str(invocation.stdin.as_deref().unwrap()).unwrap();
        assert_eq!(values["replicaCount"], 2);
        assert_eq!(values["service"]["type"], "ClusterIP");
    }

    #[test]
    fn test_install_without_values_has_no_stdin() {
        let params = InstallParams {
            name: "web".to_string(),
            chart: "./charts/web".to_string(),
            create_namespace: false,
            ..Default::default()
        };
        let invocation = params.invocation("default").unwrap();
        assert_eq!(args(&invocation), vec!["install", "web", "./charts/web", "--namespace", "default"]);
        assert!(invocation.stdin.is_none());
    }

    #[test]
    fn test_upgrade_install_flag() {
        let params = UpgradeParams {
            name: "web".to_string(),
            chart: "bitnami/nginx".to_string(),
            install: true,
            ..Default::default()
        };
        assert_eq!(
            args(&params.invocation("default").unwrap()),
            vec!["upgrade", "web", "bitnami/nginx", "--namespace", "default", "--install"]
        );
    }

    #[test]
    fn test_option_like_chart_is_rejected() {
        let params = InstallParams {
            name: "web".to_string(),
            chart: "--post-renderer=/bin/sh".to_string(),
            ..Default::default()
        };
        assert!(matches!(params.invocation("default"), Err(ToolError::InvalidParams(_))));
    }

    #[test]
    fn test_uninstall_and_list() {
        let uninstall = UninstallParams {
            name: "web".to_string(),
            namespace: Some("apps".to_string()),
        };
        let invocation = uninstall.invocation("default").unwrap();
        assert_eq!(args(&invocation), vec!["uninstall", "web", "--namespace", "apps"]);
        assert_eq!(invocation.class, OperationClass::Write);

        let list = ListParams {
            all_namespaces: true,
            ..Default::default()
        };
        let invocation = list.invocation("default").unwrap();
        assert_eq!(args(&invocation), vec!["list", "--output", "json", "--all-namespaces"]);
        assert_eq!(invocation.format, OutputFormat::Json);
    }
}
