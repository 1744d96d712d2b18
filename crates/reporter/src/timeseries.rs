//! Cloud Monitoring v3 time series model and the builder that addresses
//! extracted samples.
//!
//! The JSON shapes mirror the REST API (`projects.timeSeries.create`,
//! `projects.metricDescriptors`), so these types serialize straight into
//! request bodies.

use std::collections::BTreeMap;

use {
    chrono::{DateTime, SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
};

use crate::extract::Sample;

/// Namespace prefixed to every user-defined metric type.
pub const DEFAULT_NAMESPACE: &str = "custom.googleapis.com";

/// Replace every `.` in a registry name with `/`.
#[must_use]
pub fn dot_slashes(name: &str) -> String {
    name.replace('.', "/")
}

/// Backend metric type for a registry name, e.g.
/// `http.requests` → `custom.googleapis.com/http/requests`.
#[must_use]
pub fn metric_type(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace.trim_end_matches('/'), dot_slashes(name))
}

/// [`metric_type`] under [`DEFAULT_NAMESPACE`].
#[must_use]
pub fn namespaced_name(name: &str) -> String {
    metric_type(DEFAULT_NAMESPACE, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    Gauge,
    Delta,
    Cumulative,
    #[serde(other)]
    MetricKindUnspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Bool,
    Int64,
    Double,
    String,
    Distribution,
    Money,
    #[serde(other)]
    ValueTypeUnspecified,
}

/// A single typed measurement. Exactly one of integer or floating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypedValue {
    /// The API encodes int64 as a JSON string.
    Int64Value(#[serde(with = "int64_string")] i64),
    DoubleValue(f64),
}

impl TypedValue {
    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, Self::DoubleValue(_))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match *self {
            Self::Int64Value(v) => v == 0,
            Self::DoubleValue(v) => v == 0.0,
        }
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int64Value(_) => ValueType::Int64,
            Self::DoubleValue(_) => ValueType::Double,
        }
    }
}

mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(i64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Num(n) => Ok(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// The entity a metric is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    #[must_use]
    pub fn new(resource_type: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            labels,
        }
    }

    /// The process-global `global` resource. The backend fills in
    /// `project_id` from the request scope.
    #[must_use]
    pub fn global() -> Self {
        Self::new("global", BTreeMap::new())
    }
}

impl Default for MonitoredResource {
    fn default() -> Self {
        Self::global()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl TimeInterval {
    /// An instantaneous interval ending at `end`.
    #[must_use]
    pub fn at(end: DateTime<Utc>) -> Self {
        Self {
            end_time: end.to_rfc3339_opts(SecondsFormat::Millis, true),
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub interval: TimeInterval,
    pub value: TypedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub metric: Metric,
    pub resource: MonitoredResource,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub points: Vec<Point>,
}

impl TimeSeries {
    #[must_use]
    pub fn metric_type(&self) -> &str {
        &self.metric.metric_type
    }

    /// Value of the single point this reporter writes per series.
    #[must_use]
    pub fn value(&self) -> Option<TypedValue> {
        self.points.first().map(|p| p.value)
    }
}

/// Body of `projects.timeSeries.create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeSeriesRequest<'a> {
    pub time_series: &'a [TimeSeries],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDescriptor {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    /// Resource name assigned by the backend. Absent on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default = "unspecified_kind")]
    pub metric_kind: MetricKind,
    #[serde(default = "unspecified_value_type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDescriptor>,
}

fn unspecified_kind() -> MetricKind {
    MetricKind::MetricKindUnspecified
}

fn unspecified_value_type() -> ValueType {
    ValueType::ValueTypeUnspecified
}

/// Everything a tick needs to address a sample, fixed for a reporter's life.
#[derive(Debug, Clone)]
pub struct SeriesContext {
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub resource: MonitoredResource,
}

impl Default for SeriesContext {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            labels: BTreeMap::new(),
            resource: MonitoredResource::global(),
        }
    }
}

/// Address one sample of registry metric `name` as a single-point gauge series.
#[must_use]
pub fn build_time_series(
    name: &str,
    sample: &Sample,
    end: DateTime<Utc>,
    ctx: &SeriesContext,
) -> TimeSeries {
    let full_name = format!("{name}{}", sample.suffix);
    TimeSeries {
        metric: Metric {
            metric_type: metric_type(&ctx.namespace, &full_name),
            labels: ctx.labels.clone(),
        },
        resource: ctx.resource.clone(),
        metric_kind: MetricKind::Gauge,
        value_type: sample.value.value_type(),
        points: vec![Point {
            interval: TimeInterval::at(end),
            value: sample.value,
        }],
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, serde_json::json};

    fn tick_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn metric_type_is_stable_and_namespaced() {
        let first = namespaced_name("http.requests");
        let second = namespaced_name("http.requests");
        assert_eq!(first, second);
        assert_eq!(first, "custom.googleapis.com/http/requests");
        assert_eq!(
            namespaced_name("http_requests"),
            "custom.googleapis.com/http_requests"
        );
    }

    #[test]
    fn namespace_trailing_slash_is_ignored() {
        assert_eq!(metric_type("custom.googleapis.com/app/", "a.b"), "custom.googleapis.com/app/a/b");
    }

    #[test]
    fn int64_values_serialize_as_strings() {
        let v = serde_json::to_value(TypedValue::Int64Value(10)).unwrap();
        assert_eq!(v, json!({"int64Value": "10"}));
        let d = serde_json::to_value(TypedValue::DoubleValue(1.5)).unwrap();
        assert_eq!(d, json!({"doubleValue": 1.5}));
    }

    #[test]
    fn int64_values_deserialize_from_string_or_number() {
        let a: TypedValue = serde_json::from_value(json!({"int64Value": "42"})).unwrap();
        let b: TypedValue = serde_json::from_value(json!({"int64Value": 42})).unwrap();
        assert_eq!(a, TypedValue::Int64Value(42));
        assert_eq!(a, b);
    }

    #[test]
    fn builder_attaches_labels_resource_and_interval() {
        let ctx = SeriesContext {
            labels: BTreeMap::from([("source".to_string(), "host-1".to_string())]),
            ..SeriesContext::default()
        };
        let sample = Sample {
            suffix: ".count",
            value: TypedValue::Int64Value(5),
        };

        let ts = build_time_series("http.requests", &sample, tick_time(), &ctx);

        assert_eq!(ts.metric_type(), "custom.googleapis.com/http/requests/count");
        assert_eq!(ts.metric.labels.get("source").map(String::as_str), Some("host-1"));
        assert_eq!(ts.resource, MonitoredResource::global());
        assert_eq!(ts.metric_kind, MetricKind::Gauge);
        assert_eq!(ts.value_type, ValueType::Int64);
        assert_eq!(ts.points.len(), 1);
        assert_eq!(ts.points[0].interval.end_time, "2024-05-01T12:00:00.000Z");
        assert!(ts.points[0].interval.start_time.is_none());
    }

    #[test]
    fn time_series_wire_format() {
        let sample = Sample {
            suffix: "",
            value: TypedValue::DoubleValue(0.5),
        };
        let ts = build_time_series("load", &sample, tick_time(), &SeriesContext::default());
        let v = serde_json::to_value(&ts).unwrap();
        assert_eq!(
            v,
            json!({
                "metric": {"type": "custom.googleapis.com/load"},
                "resource": {"type": "global"},
                "metricKind": "GAUGE",
                "valueType": "DOUBLE",
                "points": [{
                    "interval": {"endTime": "2024-05-01T12:00:00.000Z"},
                    "value": {"doubleValue": 0.5}
                }]
            })
        );
    }

    #[test]
    fn descriptor_tolerates_unknown_enum_values() {
        let d: MetricDescriptor = serde_json::from_value(json!({
            "name": "projects/p/metricDescriptors/custom.googleapis.com/x",
            "type": "custom.googleapis.com/x",
            "metricKind": "SOMETHING_NEW",
        }))
        .unwrap();
        assert_eq!(d.metric_kind, MetricKind::MetricKindUnspecified);
        assert_eq!(d.value_type, ValueType::ValueTypeUnspecified);
    }
}
