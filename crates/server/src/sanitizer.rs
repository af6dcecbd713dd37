//! Output Sanitizer
//!
//! Redacts the data of Secret resources in kubectl output. Keys and document
//! shape are kept; only values are replaced with [`REDACTION_MARKER`]. Output
//! that contains nothing to redact is returned byte for byte.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::Resource;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub const REDACTION_MARKER: &str = "***";

const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// What the caller expects the output to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Text,
}

impl OutputFormat {
    /// Format implied by a kubectl `-o` value.
    pub fn from_output_flag(output: &str) -> Self {
        match output {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Text => f.write_str("text"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SanitizationError {
    #[error("Output declared as {format} could not be parsed: {detail}")]
    Unparseable { format: OutputFormat, detail: String },
}

/// Which resources to redact and which of their fields hold secret values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationRule {
    pub kind: String,
    pub api_version: String,
    /// Top-level fields whose values (or map entry values) are redacted.
    pub fields: Vec<String>,
    /// Metadata annotations that may embed a copy of the secret values.
    pub annotations: Vec<String>,
}

impl SanitizationRule {
    pub fn secret() -> Self {
        Self {
            kind: Secret::KIND.to_string(),
            api_version: Secret::API_VERSION.to_string(),
            fields: vec!["data".to_string(), "stringData".to_string()],
            annotations: vec![LAST_APPLIED_ANNOTATION.to_string()],
        }
    }

    fn matches(&self, object: &Map<String, Value>) -> bool {
        let kind_matches = object.get("kind").and_then(Value::as_str) == Some(self.kind.as_str());
        let version_matches = match object.get("apiVersion").and_then(Value::as_str) {
            Some(version) => version == self.api_version,
            None => true,
        };
        kind_matches && version_matches
    }

    fn apply(&self, object: &mut Map<String, Value>) -> bool {
        let mut changed = false;
        for field in &self.fields {
            if let Some(value) = object.get_mut(field) {
                changed |= mask_field(value);
            }
        }

        let annotations = object
            .get_mut("metadata")
            .and_then(|m| m.get_mut("annotations"))
            .and_then(Value::as_object_mut);
        if let Some(annotations) = annotations {
            for key in &self.annotations {
                if let Some(value) = annotations.get_mut(key) {
                    changed |= mask_value(value);
                }
            }
        }
        changed
    }
}

fn mask_field(value: &mut Value) -> bool {
    match value {
        Value::Object(entries) => entries.values_mut().fold(false, |changed, v| mask_value(v) || changed),
        other => mask_value(other),
    }
}

fn mask_value(value: &mut Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) if s == REDACTION_MARKER => false,
        _ => {
            *value = Value::String(REDACTION_MARKER.to_string());
            true
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sanitizer {
    enabled: bool,
    passthrough_unparseable: bool,
    rules: Vec<SanitizationRule>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Sanitizer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            passthrough_unparseable: true,
            rules: vec![SanitizationRule::secret()],
        }
    }

    /// Fail on structured output that does not parse instead of passing it on.
    pub fn strict(mut self) -> Self {
        self.passthrough_unparseable = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sanitize(&self, raw: &str, format: OutputFormat) -> Result<String, SanitizationError> {
        if !self.enabled || raw.trim().is_empty() {
            return Ok(raw.to_string());
        }

        let attempt = match format {
            OutputFormat::Json => self.sanitize_json(raw),
            OutputFormat::Yaml => self.sanitize_yaml(raw),
            OutputFormat::Text => return Ok(self.sanitize_text(raw)),
        };

        match attempt {
            Ok(Some(sanitized)) => Ok(sanitized),
            Ok(None) => Ok(raw.to_string()),
            Err(detail) if self.passthrough_unparseable => {
                debug!(%format, %detail, "Output not parseable, passing it through");
                Ok(raw.to_string())
            }
            Err(detail) => Err(SanitizationError::Unparseable { format, detail }),
        }
    }

    // Text output is scanned for embedded documents on a best-effort basis.
    fn sanitize_text(&self, raw: &str) -> String {
        let trimmed = raw.trim_start();
        let attempt = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            self.sanitize_json(raw)
        } else {
            self.sanitize_yaml(raw)
        };
        match attempt {
            Ok(Some(sanitized)) => sanitized,
            _ => raw.to_string(),
        }
    }

    fn sanitize_json(&self, raw: &str) -> Result<Option<String>, String> {
        let mut value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if !self.redact(&mut value) {
            return Ok(None);
        }
        let mut out = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        if raw.ends_with('\n') {
            out.push('\n');
        }
        Ok(Some(out))
    }

    fn sanitize_yaml(&self, raw: &str) -> Result<Option<String>, String> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(raw) {
            let value = Value::deserialize(document).map_err(|e| e.to_string())?;
            documents.push(value);
        }

        let mut changed = false;
        for document in documents.iter_mut() {
            changed |= self.redact(document);
        }
        if !changed {
            return Ok(None);
        }

        let rendered = documents
            .iter()
            .map(serde_yaml::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        Ok(Some(rendered.join("---\n")))
    }

    fn redact(&self, value: &mut Value) -> bool {
        match value {
            Value::Object(object) => {
                let mut changed = false;
                if let Some(rule) = self.rules.iter().find(|r| r.matches(object)) {
                    changed |= rule.apply(object);
                }
                for child in object.values_mut() {
                    changed |= self.redact(child);
                }
                changed
            }
            Value::Array(items) => items.iter_mut().fold(false, |changed, v| self.redact(v) || changed),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_JSON: &str = r#"{
    "apiVersion": "v1",
    "kind": "Secret",
    "metadata": {"name": "db-credentials", "namespace": "default"},
    "type": "Opaque",
    "data": {"password": "cDQkJHc=", "token": "dG9r"}
}"#;

    const POD_JSON: &str = r#"{
    "apiVersion": "v1",
    "kind": "Pod",
    "metadata": {"name": "web", "namespace": "default"},
    "spec": {"containers": [{"name": "web", "image": "nginx"}]}
}"#;

    #[test]
    fn test_secret_data_values_are_redacted() {
        let out = Sanitizer::default().sanitize(SECRET_JSON, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["data"]["password"], "***");
        assert_eq!(value["data"]["token"], "***");
        assert_eq!(value["metadata"]["name"], "db-credentials");
        assert_eq!(value["type"], "Opaque");
        assert_eq!(value["data"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_non_secret_output_is_byte_identical() {
        let out = Sanitizer::default().sanitize(POD_JSON, OutputFormat::Json).unwrap();
        assert_eq!(out, POD_JSON);
    }

    #[test]
    fn test_sanitizing_twice_is_a_no_op() {
        let sanitizer = Sanitizer::default();
        let once = sanitizer.sanitize(SECRET_JSON, OutputFormat::Json).unwrap();
        let twice = sanitizer.sanitize(&once, OutputFormat::Json).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitizing_yaml_twice_is_a_no_op() {
        let yaml = "kind: ConfigMap\napiVersion: v1\ndata:\n  a: b\n---\nkind: Secret\napiVersion: v1\ndata:\n  c: ZA==\n";
        let sanitizer = Sanitizer::default();
        let once = sanitizer.sanitize(yaml, OutputFormat::Yaml).unwrap();
        let twice = sanitizer.sanitize(&once, OutputFormat::Yaml).unwrap();

        assert!(!once.contains("ZA=="));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitizing_text_twice_is_a_no_op() {
        let text = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: tls\ndata:\n  tls.key: a2V5\n";
        let sanitizer = Sanitizer::default();
        let once = sanitizer.sanitize(text, OutputFormat::Text).unwrap();
        let twice = sanitizer.sanitize(&once, OutputFormat::Text).unwrap();

        assert!(!once.contains("a2V5"));
        assert_eq!(once, twice);

        let once = sanitizer.sanitize(SECRET_JSON, OutputFormat::Text).unwrap();
        let twice = sanitizer.sanitize(&once, OutputFormat::Text).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_list_items_are_redacted() {
        let list = format!(
            r#"{{"apiVersion": "v1", "kind": "List", "items": [{}, {}]}}"#,
            SECRET_JSON, POD_JSON
        );
        let out = Sanitizer::default().sanitize(&list, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["items"][0]["data"]["password"], "***");
        assert_eq!(value["items"][1]["spec"]["containers"][0]["image"], "nginx");
    }

    #[test]
    fn test_yaml_secret_string_data_and_annotation() {
        let yaml = r#"apiVersion: v1
kind: Secret
metadata:
  name: api
  annotations:
    kubectl.kubernetes.io/last-applied-configuration: '{"stringData":{"key":"plain"}}'
    team: payments
stringData:
  key: plain
"#;
        let out = Sanitizer::default().sanitize(yaml, OutputFormat::Yaml).unwrap();
        let value: Value = serde_yaml::from_str(&out).unwrap();

        assert_eq!(value["stringData"]["key"], "***");
        assert_eq!(value["metadata"]["annotations"][LAST_APPLIED_ANNOTATION], "***");
        assert_eq!(value["metadata"]["annotations"]["team"], "payments");
        assert!(!out.contains("plain"));
    }

    #[test]
    fn test_multi_document_yaml() {
        let yaml = "kind: ConfigMap\napiVersion: v1\ndata:\n  a: b\n---\nkind: Secret\napiVersion: v1\ndata:\n  c: ZA==\n";
        let out = Sanitizer::default().sanitize(yaml, OutputFormat::Yaml).unwrap();

        assert!(out.contains("a: b"));
        assert!(!out.contains("ZA=="));
        assert_eq!(out.matches("---").count(), 1);
    }

    #[test]
    fn test_null_data_is_left_alone() {
        let json = r#"{"apiVersion": "v1", "kind": "Secret", "data": null}"#;
        let out = Sanitizer::default().sanitize(json, OutputFormat::Json).unwrap();
        assert_eq!(out, json);
    }

    #[test]
    fn test_unparseable_structured_output_passes_through() {
        let raw = "error: the server doesn't have a resource type \"foo\"";
        let out = Sanitizer::default().sanitize(raw, OutputFormat::Json).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_strict_sanitizer_rejects_unparseable_output() {
        let err = Sanitizer::default()
            .strict()
            .sanitize("{\"kind\": ", OutputFormat::Json)
            .unwrap_err();
        assert!(matches!(err, SanitizationError::Unparseable { format: OutputFormat::Json, .. }));
    }

    #[test]
    fn test_text_output_passes_through() {
        let raw = "NAME      READY   STATUS\nweb-1     1/1     Running\n";
        let out = Sanitizer::default().strict().sanitize(raw, OutputFormat::Text).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_text_output_with_embedded_secret_is_redacted() {
        let out = Sanitizer::default().sanitize(SECRET_JSON, OutputFormat::Text).unwrap();
        assert!(!out.contains("cDQkJHc="));
    }

    #[test]
    fn test_disabled_sanitizer_returns_input() {
        let out = Sanitizer::new(false).sanitize(SECRET_JSON, OutputFormat::Json).unwrap();
        assert_eq!(out, SECRET_JSON);
    }

    #[test]
    fn test_custom_rule() {
        let rule = SanitizationRule {
            kind: "Credential".to_string(),
            api_version: "example.com/v1".to_string(),
            fields: vec!["spec".to_string()],
            annotations: Vec::new(),
        };
        let json = r#"{"apiVersion": "example.com/v1", "kind": "Credential", "spec": {"apiKey": "k"}}"#;
        let mut sanitizer = Sanitizer::default();
        sanitizer.rules.push(rule);
        let out = sanitizer.sanitize(json, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["spec"]["apiKey"], "***");
    }

    #[test]
    fn test_output_flag_mapping() {
        assert_eq!(OutputFormat::from_output_flag("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_output_flag("yaml"), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_output_flag("wide"), OutputFormat::Text);
    }
}
