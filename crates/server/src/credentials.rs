//! Credential Materializer
//!
//! Writes a resolved identity out as a single-context kubeconfig file that an
//! external CLI can be pointed at. The file lives exactly as long as the
//! [`CredentialArtifact`] that owns it.

use std::io::Write;
use std::path::Path;

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::executor::ExecutionError;
use crate::identity::kubeconfig::{ClusterEntry, Kubeconfig, UserEntry};
use crate::identity::{CertificateSource, Credential, KeySource, ResolvedIdentity};

const ARTIFACT_PREFIX: &str = "kube-mcp-";
const FALLBACK_CONTEXT: &str = "kube-mcp";

/// A scoped kubeconfig file for one invocation.
///
/// Created with owner-only permissions and removed when dropped, on every
/// exit path.
pub struct CredentialArtifact {
    file: NamedTempFile,
}

impl CredentialArtifact {
    pub fn materialize(identity: &ResolvedIdentity) -> Result<Self, ExecutionError> {
        let document = to_kubeconfig(identity);
        let content = document
            .to_yaml()
            .map_err(|e| ExecutionError::Materialize(format!("cannot serialize kubeconfig: {}", e)))?;

        let mut file = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| ExecutionError::Materialize(format!("cannot create kubeconfig file: {}", e)))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ExecutionError::Materialize(format!("cannot write kubeconfig file: {}", e)))?;

        debug!(path = %file.path().display(), "Materialized credential artifact");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl std::fmt::Debug for CredentialArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArtifact")
            .field("path", &self.file.path())
            .finish()
    }
}

fn to_kubeconfig(identity: &ResolvedIdentity) -> Kubeconfig {
    let (certificate_authority, certificate_authority_data) = match &identity.certificate_authority {
        Some(CertificateSource::Data(data)) => (None, Some(data.clone())),
        Some(CertificateSource::File(path)) => (Some(path.display().to_string()), None),
        None => (None, None),
    };

    let cluster = ClusterEntry {
        server: Some(identity.server.to_string()),
        insecure_skip_tls_verify: identity.insecure_skip_tls_verify.then_some(true),
        certificate_authority,
        certificate_authority_data,
        tls_server_name: identity.tls_server_name.clone(),
        proxy_url: identity.proxy_url.clone(),
    };

    let mut user = UserEntry::default();
    match identity.credential.as_ref() {
        Credential::Token(token) => user.token = Some(token.expose_secret().to_string()),
        Credential::TokenFile(path) => user.token_file = Some(path.display().to_string()),
        Credential::ClientCertificate { certificate, key } => {
            match certificate {
                CertificateSource::Data(data) => user.client_certificate_data = Some(data.clone()),
                CertificateSource::File(path) => user.client_certificate = Some(path.display().to_string()),
            }
            match key {
                KeySource::Data(data) => user.client_key_data = Some(data.expose_secret().to_string()),
                KeySource::File(path) => user.client_key = Some(path.display().to_string()),
            }
        }
        Credential::Basic { username, password } => {
            user.username = Some(username.clone());
            user.password = Some(password.expose_secret().to_string());
        }
        Credential::Exec(exec) => user.exec = Some(exec.clone()),
    }

    let context = identity.context.as_deref().unwrap_or(FALLBACK_CONTEXT);
    Kubeconfig::single(context, cluster, user, Some(identity.namespace.clone()))
}
