/// Config schema types (reporter, backend).
use std::collections::BTreeMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com/v3";
pub const DEFAULT_NAMESPACE: &str = "custom.googleapis.com";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudmonConfig {
    pub reporter: ReporterConfig,
    pub backend: BackendConfig,
}

/// What to report and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Cloud project id receiving the time series.
    pub project: String,
    /// Seconds between reports. Defaults to 60.
    pub interval_secs: u64,
    /// Failed reports in a row before the reporter stops. `0` disables the
    /// limit. Defaults to 3.
    pub max_consecutive_errors: u32,
    /// Labels attached to every time series.
    pub labels: BTreeMap<String, String>,
    /// Monitored resource; the `global` resource when unset.
    pub resource: Option<ResourceConfig>,
    /// Metric type prefix. Defaults to `custom.googleapis.com`.
    pub namespace: String,
    /// Declare gauge metric descriptors before first use. Defaults to true.
    pub declare_descriptors: bool,
    /// Deadline in seconds for all of one report's write requests together.
    pub submit_timeout_secs: Option<u64>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            interval_secs: 60,
            max_consecutive_errors: 3,
            labels: BTreeMap::new(),
            resource: None,
            namespace: DEFAULT_NAMESPACE.into(),
            declare_descriptors: true,
            submit_timeout_secs: None,
        }
    }
}

/// Monitored resource descriptor, e.g. `gce_instance` with `instance_id`
/// and `zone` labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Cloud Monitoring API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API base URL. Defaults to the public v3 endpoint.
    pub endpoint: String,
    /// OAuth2 access token sent as a bearer token.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<Secret<String>>,
    /// Per-request HTTP timeout in seconds. Defaults to 30.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: CloudmonConfig = toml::from_str("").unwrap();
        assert_eq!(config.reporter.interval_secs, 60);
        assert_eq!(config.reporter.max_consecutive_errors, 3);
        assert_eq!(config.reporter.namespace, "custom.googleapis.com");
        assert!(config.reporter.declare_descriptors);
        assert!(config.reporter.resource.is_none());
        assert_eq!(config.backend.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.backend.request_timeout_secs, 30);
    }

    #[test]
    fn full_toml_parses() {
        let config: CloudmonConfig = toml::from_str(
            r#"
            [reporter]
            project = "my-proj"
            interval_secs = 30
            max_consecutive_errors = 5

            [reporter.labels]
            source = "worker-1"

            [reporter.resource]
            type = "gce_instance"
            labels = { instance_id = "123", zone = "us-east1-b" }

            [backend]
            access_token = "ya29.secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.reporter.project, "my-proj");
        assert_eq!(config.reporter.labels["source"], "worker-1");
        let resource = config.reporter.resource.unwrap();
        assert_eq!(resource.resource_type, "gce_instance");
        assert_eq!(resource.labels["zone"], "us-east1-b");
        assert_eq!(
            config.backend.access_token.unwrap().expose_secret(),
            "ya29.secret"
        );
    }

    #[test]
    fn secret_is_not_debug_printed() {
        let backend = BackendConfig {
            access_token: Some(Secret::new("ya29.secret".into())),
            ..BackendConfig::default()
        };
        assert!(!format!("{backend:?}").contains("ya29.secret"));
    }
}
