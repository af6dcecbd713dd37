use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::executor::Deadlines;
use crate::identity::source::{EnvSource, ProcessEnv};
use crate::sanitizer::Sanitizer;

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:6000";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => f.write_str("stdio"),
            Transport::Http => f.write_str("http"),
        }
    }
}

impl FromStr for Transport {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(crate::Error::Settings(format!(
                "MCP_TRANSPORT must be 'stdio' or 'http', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub binaries: BinaryConfig,
    pub timeouts: TimeoutConfig,
    /// Redact Secret data in tool output
    pub mask_secrets: bool,
    /// Fail instead of passing through structured output that does not parse
    pub strict_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub transport: Transport,
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryConfig {
    pub kubectl: PathBuf,
    pub helm: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub read_secs: u64,
    pub write_secs: u64,
    pub release_secs: u64,
}

impl TimeoutConfig {
    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            read: Duration::from_secs(self.read_secs),
            write: Duration::from_secs(self.write_secs),
            release: Duration::from_secs(self.release_secs),
        }
    }
}

impl Config {
    pub fn sanitizer(&self) -> Sanitizer {
        let sanitizer = Sanitizer::new(self.mask_secrets);
        if self.strict_output {
            sanitizer.strict()
        } else {
            sanitizer
        }
    }

    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_env(&ProcessEnv)
    }

    pub fn from_env(env: &dyn EnvSource) -> crate::Result<Self> {
        let defaults = Config::default();

        let config = Config {
            server: ServerConfig {
                transport: match env.var("MCP_TRANSPORT") {
                    Some(value) => value.parse()?,
                    None => defaults.server.transport,
                },
                addr: env.var("MCP_HTTP_ADDR").unwrap_or(defaults.server.addr),
            },
            binaries: BinaryConfig {
                kubectl: env
                    .var("KUBECTL_BIN")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.binaries.kubectl),
                helm: env
                    .var("HELM_BIN")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.binaries.helm),
            },
            timeouts: TimeoutConfig {
                read_secs: seconds(env, "READ_TIMEOUT_SECS", defaults.timeouts.read_secs),
                write_secs: seconds(env, "WRITE_TIMEOUT_SECS", defaults.timeouts.write_secs),
                release_secs: seconds(env, "RELEASE_TIMEOUT_SECS", defaults.timeouts.release_secs),
            },
            mask_secrets: env
                .var("MASK_SECRETS")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            strict_output: env
                .var("STRICT_OUTPUT")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        if !config.mask_secrets {
            tracing::warn!("MASK_SECRETS=false: Secret data will be returned unredacted");
        }

        Ok(config)
    }
}

// Unparseable or zero values fall back to the default.
fn seconds(env: &dyn EnvSource, key: &str, default: u64) -> u64 {
    match env.var(key).map(|v| v.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => secs,
        Some(_) => {
            tracing::warn!(key, default, "Invalid timeout, using default");
            default
        }
        None => default,
    }
}

impl Default for Config {
    fn default() -> Self {
        let deadlines = Deadlines::default();
        Self {
            server: ServerConfig {
                transport: Transport::Stdio,
                addr: DEFAULT_HTTP_ADDR.to_string(),
            },
            binaries: BinaryConfig {
                kubectl: PathBuf::from("kubectl"),
                helm: PathBuf::from("helm"),
            },
            timeouts: TimeoutConfig {
                read_secs: deadlines.read.as_secs(),
                write_secs: deadlines.write.as_secs(),
                release_secs: deadlines.release.as_secs(),
            },
            mask_secrets: true,
            strict_output: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::OutputFormat;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env(&env(&[])).unwrap();

        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.addr, DEFAULT_HTTP_ADDR);
        assert_eq!(config.binaries.kubectl, PathBuf::from("kubectl"));
        assert_eq!(config.timeouts.deadlines(), Deadlines::default());
        assert!(config.mask_secrets);
        assert!(!config.strict_output);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_env(&env(&[
            ("MCP_TRANSPORT", "HTTP"),
            ("MCP_HTTP_ADDR", "0.0.0.0:7000"),
            ("HELM_BIN", "/opt/bin/helm"),
            ("RELEASE_TIMEOUT_SECS", "300"),
        ]))
        .unwrap();

        assert_eq!(config.server.transport, Transport::Http);
        assert_eq!(config.server.addr, "0.0.0.0:7000");
        assert_eq!(config.binaries.helm, PathBuf::from("/opt/bin/helm"));
        assert_eq!(config.timeouts.deadlines().release, Duration::from_secs(300));
    }

    #[test]
    fn test_only_literal_false_disables_masking() {
        assert!(!Config::from_env(&env(&[("MASK_SECRETS", "False")])).unwrap().mask_secrets);
        assert!(Config::from_env(&env(&[("MASK_SECRETS", "0")])).unwrap().mask_secrets);
        assert!(Config::from_env(&env(&[("MASK_SECRETS", "no")])).unwrap().mask_secrets);
    }

    #[test]
    fn test_sanitizer_follows_settings() {
        let config = Config::from_env(&env(&[("STRICT_OUTPUT", "true")])).unwrap();
        let sanitizer = config.sanitizer();
        assert!(sanitizer.is_enabled());
        assert!(sanitizer.sanitize("{\"kind\": ", OutputFormat::Json).is_err());

        let config = Config::from_env(&env(&[("MASK_SECRETS", "false")])).unwrap();
        let sanitizer = config.sanitizer();
        assert!(!sanitizer.is_enabled());
        assert!(sanitizer.sanitize("{\"kind\": ", OutputFormat::Json).is_ok());
    }

    #[test]
    fn test_strict_output_is_opt_in() {
        assert!(!Config::from_env(&env(&[])).unwrap().strict_output);
        assert!(!Config::from_env(&env(&[("STRICT_OUTPUT", "yes")])).unwrap().strict_output);
        assert!(Config::from_env(&env(&[("STRICT_OUTPUT", "TRUE")])).unwrap().strict_output);
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = Config::from_env(&env(&[("READ_TIMEOUT_SECS", "soon"), ("WRITE_TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(config.timeouts.read_secs, 60);
        assert_eq!(config.timeouts.write_secs, 60);
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        assert!(Config::from_env(&env(&[("MCP_TRANSPORT", "websocket")])).is_err());
    }
}
