//! Identity sources
//!
//! The places a cluster identity can come from, in fixed priority order, and
//! the environment abstraction used to look them up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::kubeconfig::{ClusterEntry, ContextEntry, Kubeconfig, NamedCluster, NamedContext, NamedUser, UserEntry};
use super::{ConfigError, ConfigErrorKind};

pub const KUBECONFIG_YAML: &str = "KUBECONFIG_YAML";
pub const KUBECONFIG_JSON: &str = "KUBECONFIG_JSON";
pub const K8S_SERVER: &str = "K8S_SERVER";
pub const K8S_TOKEN: &str = "K8S_TOKEN";
pub const K8S_SKIP_TLS_VERIFY: &str = "K8S_SKIP_TLS_VERIFY";
pub const KUBECONFIG_PATH: &str = "KUBECONFIG_PATH";
pub const KUBECONFIG: &str = "KUBECONFIG";
pub const K8S_CONTEXT: &str = "K8S_CONTEXT";
pub const K8S_NAMESPACE: &str = "K8S_NAMESPACE";

pub const MINIMAL_CLUSTER: &str = "env-cluster";
pub const MINIMAL_USER: &str = "env-user";
pub const MINIMAL_CONTEXT: &str = "env-context";

/// Read access to environment values.
///
/// Empty values are reported as absent.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Yaml,
    Json,
    Minimal,
    Path,
    DefaultPath,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Yaml => KUBECONFIG_YAML,
            SourceKind::Json => KUBECONFIG_JSON,
            SourceKind::Minimal => "K8S_SERVER/K8S_TOKEN",
            SourceKind::Path => "KUBECONFIG_PATH/KUBECONFIG",
            SourceKind::DefaultPath => "~/.kube/config",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selected identity source. Immutable once read.
#[derive(Clone)]
pub enum IdentitySource {
    Yaml(String),
    Json(String),
    Minimal {
        server: String,
        token: String,
        skip_tls_verify: bool,
    },
    Path(PathBuf),
    DefaultPath(PathBuf),
}

impl std::fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentitySource::Yaml(_) => f.write_str("Yaml(..)"),
            IdentitySource::Json(_) => f.write_str("Json(..)"),
            IdentitySource::Minimal { server, skip_tls_verify, .. } => f
                .debug_struct("Minimal")
                .field("server", server)
                .field("skip_tls_verify", skip_tls_verify)
                .finish_non_exhaustive(),
            IdentitySource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            IdentitySource::DefaultPath(path) => f.debug_tuple("DefaultPath").field(path).finish(),
        }
    }
}

/// A parsed kubeconfig document together with the directory relative file
/// references in it are resolved against.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub kind: SourceKind,
    pub document: Kubeconfig,
    pub base_dir: Option<PathBuf>,
}

impl IdentitySource {
    /// Select the highest priority source that is present.
    ///
    /// A half-configured minimal source (server without token or the reverse)
    /// is an error rather than a reason to look further down the list.
    pub fn select(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        if let Some(yaml) = env.var(KUBECONFIG_YAML) {
            return Ok(IdentitySource::Yaml(yaml));
        }
        if let Some(json) = env.var(KUBECONFIG_JSON) {
            return Ok(IdentitySource::Json(json));
        }

        match (env.var(K8S_SERVER), env.var(K8S_TOKEN)) {
            (Some(server), Some(token)) => {
                let skip_tls_verify = env
                    .var(K8S_SKIP_TLS_VERIFY)
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                return Ok(IdentitySource::Minimal {
                    server,
                    token,
                    skip_tls_verify,
                });
            }
            (Some(_), None) => {
                return Err(ConfigError::new(
                    ConfigErrorKind::IncompleteCredential,
                    SourceKind::Minimal,
                    format!("{} is set but {} is missing", K8S_SERVER, K8S_TOKEN),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::new(
                    ConfigErrorKind::IncompleteCredential,
                    SourceKind::Minimal,
                    format!("{} is set but {} is missing", K8S_TOKEN, K8S_SERVER),
                ));
            }
            (None, None) => {}
        }

        if let Some(path) = env.var(KUBECONFIG_PATH) {
            return Ok(IdentitySource::Path(PathBuf::from(path)));
        }
        if let Some(list) = env.var(KUBECONFIG) {
            // kubectl accepts a path list here; only the first entry is used
            if let Some(first) = std::env::split_paths(&list).find(|p| !p.as_os_str().is_empty()) {
                return Ok(IdentitySource::Path(first));
            }
        }

        match dirs::home_dir() {
            Some(home) => Ok(IdentitySource::DefaultPath(home.join(".kube").join("config"))),
            None => Err(ConfigError::new(
                ConfigErrorKind::Missing,
                SourceKind::DefaultPath,
                "no identity source configured and no home directory to find ~/.kube/config",
            )),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            IdentitySource::Yaml(_) => SourceKind::Yaml,
            IdentitySource::Json(_) => SourceKind::Json,
            IdentitySource::Minimal { .. } => SourceKind::Minimal,
            IdentitySource::Path(_) => SourceKind::Path,
            IdentitySource::DefaultPath(_) => SourceKind::DefaultPath,
        }
    }

    /// Read and parse the source into a kubeconfig document.
    pub fn load(&self) -> Result<LoadedDocument, ConfigError> {
        let kind = self.kind();
        let malformed = |detail: String| ConfigError::new(ConfigErrorKind::Malformed, kind, detail);

        let (document, base_dir) = match self {
            IdentitySource::Yaml(content) => {
                let document = Kubeconfig::from_yaml(content)
                    .map_err(|e| malformed(format!("invalid kubeconfig YAML: {}", e)))?;
                (document, None)
            }
            IdentitySource::Json(content) => {
                let document = Kubeconfig::from_json(content)
                    .map_err(|e| malformed(format!("invalid kubeconfig JSON: {}", e)))?;
                (document, None)
            }
            IdentitySource::Minimal {
                server,
                token,
                skip_tls_verify,
            } => (minimal_document(server, token, *skip_tls_verify), None),
            IdentitySource::Path(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| malformed(format!("cannot read {}: {}", path.display(), e)))?;
                let document = Kubeconfig::from_yaml(&content)
                    .map_err(|e| malformed(format!("invalid kubeconfig {}: {}", path.display(), e)))?;
                (document, path.parent().map(Path::to_path_buf))
            }
            IdentitySource::DefaultPath(path) => {
                if !path.exists() {
                    return Err(ConfigError::new(
                        ConfigErrorKind::Missing,
                        kind,
                        format!("no identity source configured and {} does not exist", path.display()),
                    ));
                }
                let content = std::fs::read_to_string(path)
                    .map_err(|e| malformed(format!("cannot read {}: {}", path.display(), e)))?;
                let document = Kubeconfig::from_yaml(&content)
                    .map_err(|e| malformed(format!("invalid kubeconfig {}: {}", path.display(), e)))?;
                (document, path.parent().map(Path::to_path_buf))
            }
        };

        debug!(source = %kind, contexts = document.contexts.len(), "Loaded kubeconfig document");

        Ok(LoadedDocument {
            kind,
            document,
            base_dir,
        })
    }
}

fn minimal_document(server: &str, token: &str, skip_tls_verify: bool) -> Kubeconfig {
    Kubeconfig {
        api_version: Some("v1".to_string()),
        kind: Some("Config".to_string()),
        clusters: vec![NamedCluster {
            name: MINIMAL_CLUSTER.to_string(),
            cluster: ClusterEntry {
                server: Some(server.to_string()),
                insecure_skip_tls_verify: Some(skip_tls_verify),
                ..Default::default()
            },
        }],
        users: vec![NamedUser {
            name: MINIMAL_USER.to_string(),
            user: UserEntry {
                token: Some(token.to_string()),
                ..Default::default()
            },
        }],
        contexts: vec![NamedContext {
            name: MINIMAL_CONTEXT.to_string(),
            context: ContextEntry {
                cluster: MINIMAL_CLUSTER.to_string(),
                user: MINIMAL_USER.to_string(),
                namespace: None,
            },
        }],
        current_context: Some(MINIMAL_CONTEXT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_yaml_beats_every_other_source() {
        let env = env(&[
            (KUBECONFIG_YAML, "clusters: []"),
            (KUBECONFIG_JSON, "{}"),
            (K8S_SERVER, "https://a:6443"),
            (K8S_TOKEN, "t"),
            (KUBECONFIG_PATH, "/tmp/config"),
        ]);
        assert_eq!(IdentitySource::select(&env).unwrap().kind(), SourceKind::Yaml);
    }

    #[test]
    fn test_json_beats_minimal_and_path() {
        let env = env(&[
            (KUBECONFIG_JSON, "{}"),
            (K8S_SERVER, "https://a:6443"),
            (K8S_TOKEN, "t"),
            (KUBECONFIG, "/tmp/config"),
        ]);
        assert_eq!(IdentitySource::select(&env).unwrap().kind(), SourceKind::Json);
    }

    #[test]
    fn test_minimal_pair_reads_skip_tls_flag() {
        let env = env(&[
            (K8S_SERVER, "https://cluster.example:6443"),
            (K8S_TOKEN, "abcd"),
            (K8S_SKIP_TLS_VERIFY, "TRUE"),
            (KUBECONFIG_PATH, "/tmp/config"),
        ]);
        match IdentitySource::select(&env).unwrap() {
            IdentitySource::Minimal { server, skip_tls_verify, .. } => {
                assert_eq!(server, "https://cluster.example:6443");
                assert!(skip_tls_verify);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_half_minimal_pair_is_incomplete() {
        let env = env(&[(K8S_SERVER, "https://a:6443"), (KUBECONFIG_PATH, "/tmp/config")]);
        let err = IdentitySource::select(&env).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::IncompleteCredential);
    }

    #[test]
    fn test_explicit_path_beats_kubeconfig_list() {
        let env = env(&[(KUBECONFIG_PATH, "/a/config"), (KUBECONFIG, "/b/config")]);
        match IdentitySource::select(&env).unwrap() {
            IdentitySource::Path(path) => assert_eq!(path, PathBuf::from("/a/config")),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let env = env(&[(KUBECONFIG_YAML, "  "), (KUBECONFIG_JSON, "{}")]);
        assert_eq!(IdentitySource::select(&env).unwrap().kind(), SourceKind::Json);
    }

    #[test]
    fn test_debug_does_not_print_inline_content() {
        let source = IdentitySource::Minimal {
            server: "https://a:6443".to_string(),
            token: "hunter2".to_string(),
            skip_tls_verify: false,
        };
        assert!(!format!("{:?}", source).contains("hunter2"));
        assert!(!format!("{:?}", IdentitySource::Yaml("token: hunter2".into())).contains("hunter2"));
    }

    #[test]
    fn test_missing_explicit_path_is_malformed() {
        let source = IdentitySource::Path(PathBuf::from("/definitely/not/here/config"));
        let err = source.load().unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::Malformed);
    }

    #[test]
    fn test_missing_default_path_is_missing() {
        let source = IdentitySource::DefaultPath(PathBuf::from("/definitely/not/here/config"));
        let err = source.load().unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::Missing);
    }

    #[test]
    fn test_path_source_records_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "apiVersion: v1\nkind: Config\nclusters: []\n").unwrap();

        let loaded = IdentitySource::Path(path).load().unwrap();
        assert_eq!(loaded.base_dir.as_deref(), Some(dir.path()));
    }
}
