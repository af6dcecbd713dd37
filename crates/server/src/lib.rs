//! Kubernetes MCP Server
//!
//! Exposes kubectl and helm operations as remotely invokable tools. Every tool
//! call resolves the active cluster identity, materializes it into a scoped
//! kubeconfig, runs the external CLI under a deadline and redacts Secret data
//! before the output is handed back to the caller.

pub mod config;
pub mod credentials;
pub mod executor;
pub mod identity;
pub mod mcp;
pub mod metrics;
pub mod sanitizer;
pub mod server;
pub mod tools;

use thiserror::Error;

pub use credentials::CredentialArtifact;
pub use executor::{CommandResult, CommandRunner, CommandSpec, ExecutionError, ProcessRunner};
pub use identity::{ConfigError, ConfigErrorKind, IdentityStore, ResolvedIdentity};
pub use sanitizer::{OutputFormat, SanitizationError, Sanitizer};
pub use tools::{ToolCall, ToolError, ToolOutcome, Toolbox};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Sanitization error: {0}")]
    Sanitization(#[from] SanitizationError),
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid setting: {0}")]
    Settings(String),
    #[error("Dependency missing: {0}")]
    Dependency(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
