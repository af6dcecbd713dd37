//! Kubeconfig document model
//!
//! Only the parts of the kubeconfig format needed to pick a context and join it
//! with its cluster and user are modelled. Unknown keys are ignored on read.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

/// Authentication entry of a kubeconfig user.
///
/// Values here are plain strings because this type is both the parse target
/// and the serialization source of the materialized kubeconfig. Resolution
/// moves secret values into `secrecy` wrappers immediately.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "tokenFile", default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<serde_yaml::Value>,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_file", &self.token_file)
            .field("client_certificate", &self.client_certificate)
            .field("client_key", &self.client_key)
            .field("client_key_data", &self.client_key_data.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("exec", &self.exec.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: ContextEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Kubeconfig {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// A document holding exactly one cluster, user and context, with that
    /// context selected.
    pub fn single(
        context_name: &str,
        cluster: ClusterEntry,
        user: UserEntry,
        namespace: Option<String>,
    ) -> Self {
        let cluster_name = format!("{}-cluster", context_name);
        let user_name = format!("{}-user", context_name);

        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            clusters: vec![NamedCluster {
                name: cluster_name.clone(),
                cluster,
            }],
            users: vec![NamedUser {
                name: user_name.clone(),
                user,
            }],
            contexts: vec![NamedContext {
                name: context_name.to_string(),
                context: ContextEntry {
                    cluster: cluster_name,
                    user: user_name,
                    namespace,
                },
            }],
            current_context: Some(context_name.to_string()),
        }
    }

    pub fn context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn user(&self, name: &str) -> Option<&NamedUser> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.iter().map(|c| c.name.as_str()).collect()
    }

    /// Context selected when no explicit context is requested: the
    /// `current-context`, or the only context when there is exactly one.
    pub fn default_context(&self) -> Option<&str> {
        match self.current_context.as_deref() {
            Some(name) if !name.is_empty() => Some(name),
            _ if self.contexts.len() == 1 => Some(self.contexts[0].name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: Config
current-context: prod
clusters:
  - name: prod-cluster
    cluster:
      server: https://prod.example:6443
      certificate-authority-data: Q0FEQVRB
  - name: dev-cluster
    cluster:
      server: https://dev.example:6443
      insecure-skip-tls-verify: true
users:
  - name: prod-admin
    user:
      token: prod-token
  - name: dev-admin
    user:
      client-certificate-data: Q0VSVA==
      client-key-data: S0VZ
contexts:
  - name: prod
    context:
      cluster: prod-cluster
      user: prod-admin
      namespace: payments
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-admin
preferences: {}
"#;

    #[test]
    fn test_parse_sample_kubeconfig() {
        let config = Kubeconfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.context_names(), vec!["prod", "dev"]);
        assert_eq!(config.default_context(), Some("prod"));

        let dev = config.context("dev").unwrap();
        let cluster = config.cluster(&dev.context.cluster).unwrap();
        assert_eq!(cluster.cluster.insecure_skip_tls_verify, Some(true));

        let user = config.user("dev-admin").unwrap();
        assert_eq!(user.user.client_key_data.as_deref(), Some("S0VZ"));
    }

    #[test]
    fn test_default_context_falls_back_to_single_context() {
        let mut config = Kubeconfig::from_yaml(SAMPLE).unwrap();
        config.current_context = None;
        assert_eq!(config.default_context(), None);

        config.contexts.truncate(1);
        assert_eq!(config.default_context(), Some("prod"));
    }

    #[test]
    fn test_single_document_round_trips_through_yaml() {
        let cluster = ClusterEntry {
            server: Some("https://cluster.example:6443".to_string()),
            ..Default::default()
        };
        let user = UserEntry {
            token: Some("abcd".to_string()),
            ..Default::default()
        };
        let doc = Kubeconfig::single("env-context", cluster, user, Some("default".to_string()));
        let parsed = Kubeconfig::from_yaml(&doc.to_yaml().unwrap()).unwrap();

        assert_eq!(parsed.current_context.as_deref(), Some("env-context"));
        let context = parsed.context("env-context").unwrap();
        assert_eq!(context.context.cluster, "env-context-cluster");
        assert_eq!(parsed.user("env-context-user").unwrap().user.token.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_user_entry_debug_hides_token() {
        let user = UserEntry {
            token: Some("very-secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", user).contains("very-secret"));
    }
}
