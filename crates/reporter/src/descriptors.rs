//! Metric descriptor declaration cache.

use std::collections::HashSet;

use crate::timeseries::{LabelDescriptor, MetricDescriptor, MetricKind, ValueType};

const DESCRIPTOR_DESCRIPTION: &str = "Created by cloudmon";

/// Metric types this reporter has already declared.
///
/// Inserting a type that is already present is a no-op.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    declared: HashSet<String>,
}

impl DescriptorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, metric_type: &str) -> bool {
        self.declared.contains(metric_type)
    }

    /// Returns `true` if `metric_type` was not yet cached.
    pub fn insert(&mut self, metric_type: impl Into<String>) -> bool {
        self.declared.insert(metric_type.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

/// Descriptor declaring a gauge of `value_type` under `metric_type`.
///
/// Explicitly declared types only accept writes carrying the label keys
/// listed here, so `label_keys` must cover every metric label the series
/// will carry.
#[must_use]
pub fn gauge_descriptor<'a>(
    metric_type: &str,
    value_type: ValueType,
    label_keys: impl IntoIterator<Item = &'a str>,
) -> MetricDescriptor {
    MetricDescriptor {
        name: None,
        metric_type: metric_type.to_string(),
        metric_kind: MetricKind::Gauge,
        value_type,
        description: DESCRIPTOR_DESCRIPTION.to_string(),
        labels: label_keys
            .into_iter()
            .map(|key| LabelDescriptor {
                key: key.to_string(),
                description: String::new(),
            })
            .collect(),
    }
}
