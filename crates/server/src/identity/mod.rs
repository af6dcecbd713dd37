//! Cluster Identity Resolution
//!
//! Resolves which cluster, credentials and namespace a tool invocation runs
//! against. The resolved identity is held process-wide as an immutable
//! snapshot; overrides build a new snapshot and swap it in whole.

pub mod kubeconfig;
pub mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use self::kubeconfig::{Kubeconfig, UserEntry};
pub use self::source::{EnvSource, IdentitySource, LoadedDocument, ProcessEnv, SourceKind};

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigErrorKind {
    Missing,
    Malformed,
    IncompleteCredential,
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErrorKind::Missing => f.write_str("missing"),
            ConfigErrorKind::Malformed => f.write_str("malformed"),
            ConfigErrorKind::IncompleteCredential => f.write_str("incomplete credential"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} cluster configuration ({origin}): {detail}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub origin: SourceKind,
    pub detail: String,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, origin: SourceKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            detail: detail.into(),
        }
    }
}

/// Public certificate material, inline or on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    Data(String),
    File(PathBuf),
}

/// Private key material, inline or on disk.
#[derive(Debug)]
pub enum KeySource {
    Data(SecretString),
    File(PathBuf),
}

/// Authentication material of a resolved identity.
pub enum Credential {
    Token(SecretString),
    TokenFile(PathBuf),
    ClientCertificate {
        certificate: CertificateSource,
        key: KeySource,
    },
    Basic {
        username: String,
        password: SecretString,
    },
    /// An exec credential plugin, carried through untouched.
    Exec(serde_yaml::Value),
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Token(_) => "token",
            Credential::TokenFile(_) => "token-file",
            Credential::ClientCertificate { .. } => "client-certificate",
            Credential::Basic { .. } => "basic",
            Credential::Exec(_) => "exec",
        }
    }

    fn from_entry(user: &UserEntry, base_dir: Option<&Path>) -> Option<Self> {
        let certificate = match (&user.client_certificate_data, &user.client_certificate) {
            (Some(data), _) => Some(CertificateSource::Data(data.clone())),
            (None, Some(file)) => Some(CertificateSource::File(resolve_path(file, base_dir))),
            (None, None) => None,
        };
        let key = match (&user.client_key_data, &user.client_key) {
            (Some(data), _) => Some(KeySource::Data(SecretString::from(data.clone()))),
            (None, Some(file)) => Some(KeySource::File(resolve_path(file, base_dir))),
            (None, None) => None,
        };
        if let (Some(certificate), Some(key)) = (certificate, key) {
            return Some(Credential::ClientCertificate { certificate, key });
        }

        if let Some(token) = user.token.as_ref().filter(|t| !t.is_empty()) {
            return Some(Credential::Token(SecretString::from(token.clone())));
        }
        if let Some(file) = user.token_file.as_ref().filter(|f| !f.is_empty()) {
            return Some(Credential::TokenFile(resolve_path(file, base_dir)));
        }
        if let (Some(username), Some(password)) = (&user.username, &user.password) {
            return Some(Credential::Basic {
                username: username.clone(),
                password: SecretString::from(password.clone()),
            });
        }
        user.exec.clone().map(Credential::Exec)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::TokenFile(path) => f.debug_tuple("TokenFile").field(path).finish(),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            other => write!(f, "Credential({})", other.kind()),
        }
    }
}

/// The concrete cluster identity an invocation runs with.
///
/// Never mutated after construction. Derived identities are new values.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub server: Url,
    pub credential: Arc<Credential>,
    pub certificate_authority: Option<CertificateSource>,
    pub insecure_skip_tls_verify: bool,
    pub tls_server_name: Option<String>,
    pub proxy_url: Option<String>,
    pub context: Option<String>,
    pub namespace: String,
    pub source: SourceKind,
}

impl ResolvedIdentity {
    /// Same identity, different namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub name: String,
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub current: bool,
}

/// Turns the selected identity source into resolved identities.
///
/// Holds the parsed document so that context overrides can be resolved
/// later without re-reading the environment.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    loaded: LoadedDocument,
    default_context: Option<String>,
    default_namespace: Option<String>,
}

impl IdentityResolver {
    pub fn load(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let source = IdentitySource::select(env)?;
        let loaded = source.load()?;

        Ok(Self::from_document(
            loaded,
            env.var(source::K8S_CONTEXT),
            env.var(source::K8S_NAMESPACE),
        ))
    }

    pub fn from_document(
        loaded: LoadedDocument,
        default_context: Option<String>,
        default_namespace: Option<String>,
    ) -> Self {
        Self {
            loaded,
            default_context,
            default_namespace,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.loaded.kind
    }

    pub fn document(&self) -> &Kubeconfig {
        &self.loaded.document
    }

    pub fn resolve(&self) -> Result<ResolvedIdentity, ConfigError> {
        self.resolve_with(None, None)
    }

    /// Resolve with an optional context and namespace taking precedence over
    /// the configured defaults.
    ///
    /// Namespace precedence: argument, `K8S_NAMESPACE`, the context's own
    /// namespace, then `default`.
    pub fn resolve_with(
        &self,
        context: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<ResolvedIdentity, ConfigError> {
        let origin = self.loaded.kind;
        let document = &self.loaded.document;
        let malformed = |detail: String| ConfigError::new(ConfigErrorKind::Malformed, origin, detail);
        let incomplete =
            |detail: String| ConfigError::new(ConfigErrorKind::IncompleteCredential, origin, detail);

        if document.contexts.is_empty() {
            return Err(incomplete("kubeconfig defines no contexts".to_string()));
        }

        let context_name = context
            .map(str::to_string)
            .or_else(|| self.default_context.clone())
            .or_else(|| document.default_context().map(str::to_string))
            .ok_or_else(|| {
                malformed(format!(
                    "no current-context set and {} contexts to choose from",
                    document.contexts.len()
                ))
            })?;

        let named_context = document
            .context(&context_name)
            .ok_or_else(|| {
                malformed(format!(
                    "context '{}' not found, available: {}",
                    context_name,
                    document.context_names().join(", ")
                ))
            })?;
        let entry = &named_context.context;

        let cluster = document.cluster(&entry.cluster).ok_or_else(|| {
            malformed(format!(
                "context '{}' references unknown cluster '{}'",
                context_name, entry.cluster
            ))
        })?;
        let user = document.user(&entry.user).ok_or_else(|| {
            malformed(format!(
                "context '{}' references unknown user '{}'",
                context_name, entry.user
            ))
        })?;

        let server = cluster
            .cluster
            .server
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| incomplete(format!("cluster '{}' has no server URL", cluster.name)))?;
        let server = Url::parse(server)
            .map_err(|e| malformed(format!("cluster '{}' server URL is invalid: {}", cluster.name, e)))?;

        let base_dir = self.loaded.base_dir.as_deref();
        let credential = Credential::from_entry(&user.user, base_dir).ok_or_else(|| {
            incomplete(format!("user '{}' carries no usable credential", user.name))
        })?;

        let certificate_authority = match (
            &cluster.cluster.certificate_authority_data,
            &cluster.cluster.certificate_authority,
        ) {
            (Some(data), _) => Some(CertificateSource::Data(data.clone())),
            (None, Some(file)) => Some(CertificateSource::File(resolve_path(file, base_dir))),
            (None, None) => None,
        };

        let namespace = namespace
            .map(str::to_string)
            .or_else(|| self.default_namespace.clone())
            .or_else(|| entry.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Ok(ResolvedIdentity {
            server,
            credential: Arc::new(credential),
            certificate_authority,
            insecure_skip_tls_verify: cluster.cluster.insecure_skip_tls_verify.unwrap_or(false),
            tls_server_name: cluster.cluster.tls_server_name.clone(),
            proxy_url: cluster.cluster.proxy_url.clone(),
            context: Some(context_name),
            namespace,
            source: origin,
        })
    }

    pub fn contexts(&self, current: Option<&str>) -> Vec<ContextSummary> {
        self.loaded
            .document
            .contexts
            .iter()
            .map(|c| ContextSummary {
                name: c.name.clone(),
                cluster: c.context.cluster.clone(),
                namespace: c.context.namespace.clone(),
                current: current == Some(c.name.as_str()),
            })
            .collect()
    }
}

fn resolve_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(path);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

/// Process-wide holder of the active identity snapshot.
///
/// A failed resolution is kept as the current state so that every tool call
/// reports it, instead of taking the process down.
pub struct IdentityStore {
    resolver: Result<IdentityResolver, ConfigError>,
    current: RwLock<Result<Arc<ResolvedIdentity>, ConfigError>>,
}

impl IdentityStore {
    pub fn initialize(env: &dyn EnvSource) -> Self {
        match IdentityResolver::load(env) {
            Ok(resolver) => Self::from_resolver(resolver),
            Err(e) => {
                warn!(error = %e, "No usable cluster identity; cluster tools will report this error");
                Self {
                    resolver: Err(e.clone()),
                    current: RwLock::new(Err(e)),
                }
            }
        }
    }

    pub fn from_resolver(resolver: IdentityResolver) -> Self {
        let current = resolver.resolve().map(Arc::new);
        match &current {
            Ok(identity) => info!(
                source = %identity.source,
                context = identity.context.as_deref().unwrap_or("<none>"),
                namespace = %identity.namespace,
                credential = identity.credential.kind(),
                "Resolved cluster identity"
            ),
            Err(e) => warn!(error = %e, "Cluster identity could not be resolved"),
        }

        Self {
            resolver: Ok(resolver),
            current: RwLock::new(current),
        }
    }

    /// The identity an invocation should capture at its start.
    pub async fn snapshot(&self) -> Result<Arc<ResolvedIdentity>, ConfigError> {
        self.current.read().await.clone()
    }

    /// Resolve a new identity and install it as the active snapshot.
    ///
    /// Without an explicit context the current context is kept. In-flight
    /// invocations keep the snapshot they already hold.
    pub async fn switch(
        &self,
        context: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<Arc<ResolvedIdentity>, ConfigError> {
        let resolver = self.resolver.as_ref().map_err(Clone::clone)?;

        let mut current = self.current.write().await;
        let identity = match (context, namespace, current.as_ref()) {
            // Namespace only: derive from the active identity
            (None, Some(namespace), Ok(active)) => Arc::new(active.with_namespace(namespace)),
            _ => {
                let kept_context = current.as_ref().ok().and_then(|i| i.context.clone());
                let target = context.map(str::to_string).or(kept_context);
                Arc::new(resolver.resolve_with(target.as_deref(), namespace)?)
            }
        };
        *current = Ok(identity.clone());

        info!(
            context = identity.context.as_deref().unwrap_or("<none>"),
            namespace = %identity.namespace,
            "Installed new cluster identity snapshot"
        );
        Ok(identity)
    }

    pub async fn contexts(&self) -> Result<Vec<ContextSummary>, ConfigError> {
        let resolver = self.resolver.as_ref().map_err(Clone::clone)?;
        let current = self.current.read().await;
        let current_name = current.as_ref().ok().and_then(|i| i.context.clone());
        Ok(resolver.contexts(current_name.as_deref()))
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.resolver.as_ref().ok().map(IdentityResolver::source_kind)
    }
}
