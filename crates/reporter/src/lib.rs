//! Publishes a cloudmon metrics registry to Google Cloud Monitoring.
//!
//! Every tick the reporter scans the registry, turns each non-zero
//! instrument value into a single-point gauge time series, and writes the
//! whole batch in one request. After `max_consecutive_errors` failed writes
//! in a row the loop stops for good.
//!
//! Histograms and timers have no single-value representation and are
//! skipped with a one-time warning.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use cloudmon_metrics::MetricsRegistry;
//! use cloudmon_reporter::{HttpBackend, Reporter, ReporterOptions};
//!
//! let registry = Arc::new(MetricsRegistry::new());
//! let backend = Arc::new(HttpBackend::new(DEFAULT_ENDPOINT, Some(token), timeout)?);
//! let handle = Reporter::new(registry, backend, ReporterOptions::new("my-project"))?.spawn();
//! ```

pub mod backend;
pub mod batch;
pub mod descriptors;
pub mod diagnostics;
mod error;
pub mod extract;
pub mod http;
pub mod reporter;
pub mod timeseries;

pub use {
    backend::{MemoryBackend, MonitoringBackend},
    batch::{Batch, build_batch},
    error::{Context, Error, Result},
    extract::{Sample, extract},
    http::{DEFAULT_ENDPOINT, HttpBackend},
    reporter::{
        ErrorTracker, Halted, MAX_TIME_SERIES_PER_REQUEST, Reporter, ReporterHandle,
        ReporterOptions, TickOutcome,
    },
    timeseries::{
        MetricDescriptor, MonitoredResource, TimeSeries, TypedValue, metric_type, namespaced_name,
    },
};
