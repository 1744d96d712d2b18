//! Configuration validation engine.
//!
//! Checks parsed settings for values the reporter would reject or silently
//! misbehave on, and flags unknown or misspelled keys in config files.

use std::{collections::HashMap, path::Path};

use crate::schema::CloudmonConfig;

/// Resource types Cloud Monitoring accepts without extra labels.
const LABEL_FREE_RESOURCE_TYPES: &[&str] = &["global"];

/// Resource types commonly used for custom metrics.
const KNOWN_RESOURCE_TYPES: &[&str] = &[
    "global",
    "gce_instance",
    "gke_container",
    "k8s_container",
    "k8s_pod",
    "k8s_node",
    "generic_node",
    "generic_task",
    "aws_ec2_instance",
    "cloud_run_revision",
];

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "reporter.interval_secs"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Semantic checks ─────────────────────────────────────────────────────────

/// Validate already-parsed settings.
#[must_use]
pub fn validate(config: &CloudmonConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_reporter(config, &mut diagnostics);
    check_backend(config, &mut diagnostics);
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_reporter(config: &CloudmonConfig, diagnostics: &mut Vec<Diagnostic>) {
    let reporter = &config.reporter;

    if reporter.project.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "reporter.project",
            "project id is required (set reporter.project or GOOGLE_CLOUD_PROJECT)",
        ));
    }

    if reporter.interval_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "reporter.interval_secs",
            "reporting interval must be at least one second",
        ));
    }

    if reporter.max_consecutive_errors == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "reporter.max_consecutive_errors",
            "0 disables the circuit breaker; the reporter will retry forever",
        ));
    }

    if reporter.submit_timeout_secs == Some(0) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "reporter.submit_timeout_secs",
            "submit timeout must be at least one second",
        ));
    }

    if reporter.namespace.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "reporter.namespace",
            "metric namespace must not be empty",
        ));
    }

    check_label_keys(reporter.labels.keys(), "reporter.labels", diagnostics);

    if let Some(resource) = &reporter.resource {
        if resource.resource_type.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "value",
                "reporter.resource.type",
                "resource type must not be empty",
            ));
        } else if !KNOWN_RESOURCE_TYPES.contains(&resource.resource_type.as_str())
            && resource.labels.is_empty()
        {
            let hint = suggest(&resource.resource_type, KNOWN_RESOURCE_TYPES, 3)
                .map(|s| format!(" (did you mean \"{s}\"?)"))
                .unwrap_or_default();
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                "value",
                "reporter.resource.type",
                format!(
                    "unknown resource type \"{}\" has no labels; writes may be rejected{hint}",
                    resource.resource_type
                ),
            ));
        } else if !LABEL_FREE_RESOURCE_TYPES.contains(&resource.resource_type.as_str())
            && resource.labels.is_empty()
        {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "value",
                "reporter.resource.labels",
                format!(
                    "resource type \"{}\" usually requires labels",
                    resource.resource_type
                ),
            ));
        }
        check_label_keys(
            resource.labels.keys(),
            "reporter.resource.labels",
            diagnostics,
        );
    }
}

fn check_label_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in keys {
        if key.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "value",
                prefix,
                "label keys must not be empty",
            ));
        } else if !is_valid_label_key(key) {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "value",
                format!("{prefix}.{key}"),
                "label keys should start with a lowercase letter and use only [a-z0-9_]",
            ));
        }
    }
}

fn is_valid_label_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_backend(config: &CloudmonConfig, diagnostics: &mut Vec<Diagnostic>) {
    let backend = &config.backend;

    if !(backend.endpoint.starts_with("https://") || backend.endpoint.starts_with("http://")) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "backend.endpoint",
            format!("endpoint \"{}\" is not an http(s) URL", backend.endpoint),
        ));
    } else if backend.endpoint.starts_with("http://") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "backend.endpoint",
            "plain http endpoint sends the access token unencrypted",
        ));
    }

    if backend.access_token.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "value",
            "backend.access_token",
            "no access token configured (set CLOUDMON_ACCESS_TOKEN)",
        ));
    }

    if backend.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "backend.request_timeout_secs",
            "request timeout must be at least one second",
        ));
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Represents the expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys (labels).
    Map,
    /// Scalar value.
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::*;

    let resource = Struct(HashMap::from([("type", Leaf), ("labels", Map)]));
    let reporter = Struct(HashMap::from([
        ("project", Leaf),
        ("interval_secs", Leaf),
        ("max_consecutive_errors", Leaf),
        ("labels", Map),
        ("resource", resource),
        ("namespace", Leaf),
        ("declare_descriptors", Leaf),
        ("submit_timeout_secs", Leaf),
    ]));
    let backend = Struct(HashMap::from([
        ("endpoint", Leaf),
        ("access_token", Leaf),
        ("request_timeout_secs", Leaf),
    ]));

    Struct(HashMap::from([("reporter", reporter), ("backend", backend)]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── File validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// when `path` is `None`.
///
/// Runs syntax, unknown-field and type checks on the raw file, then the
/// semantic checks of [`validate`] on the parsed result with env overrides
/// applied.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        let mut config = CloudmonConfig::default();
        crate::loader::apply_env_overrides(&mut config);
        let mut result = validate(&config);
        result.diagnostics.insert(
            0,
            Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            ),
        );
        return result;
    };

    let content = match std::fs::read_to_string(&actual_path) {
        Ok(content) => crate::env_subst::substitute_env(&content),
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "file-ref",
                    "",
                    format!("failed to read config file: {e}"),
                )],
                config_path: Some(actual_path),
            };
        },
    };

    let ext = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml");
    let mut result = validate_str(&content, ext);
    result.config_path = Some(actual_path);
    result
}

/// Validate config text in the given format (`toml`, `yaml`, `yml`, `json`).
#[must_use]
pub fn validate_str(content: &str, format: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match parse_value(content, format) {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", message));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<CloudmonConfig>(value) {
        Ok(mut config) => {
            crate::loader::apply_env_overrides(&mut config);
            diagnostics.extend(validate(&config).diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn parse_value(content: &str, format: &str) -> Result<serde_json::Value, String> {
    match format {
        "toml" => toml::from_str::<toml::Value>(content)
            .map_err(|e| format!("TOML syntax error: {e}"))
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| format!("YAML syntax error: {e}"))?;
            // An empty YAML document parses to null.
            if v.is_null() {
                return Ok(serde_json::Value::Object(serde_json::Map::new()));
            }
            serde_json::to_value(v).map_err(|e| e.to_string())
        },
        "json" => serde_json::from_str(content).map_err(|e| format!("JSON syntax error: {e}")),
        other => Err(format!("unsupported config format: .{other}")),
    }
}

/// Walk the value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        // Leaf, map or type mismatch; type errors are caught by deserialization.
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => {
                check_unknown_fields(child_value, child_schema, &path, diagnostics);
            },
            None => {
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}
