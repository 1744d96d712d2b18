//! Fixed-interval submission loop with a consecutive-failure breaker.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    cloudmon_config::ReporterConfig,
    cloudmon_metrics::{Counter, Gauge, MetricsRegistry, Registry, definitions},
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tracing::{debug, error, info, warn},
};

use crate::{
    backend::MonitoringBackend,
    batch::build_batch,
    descriptors::{DescriptorCache, gauge_descriptor},
    error::{Error, Result},
    timeseries::{
        CreateTimeSeriesRequest, DEFAULT_NAMESPACE, MonitoredResource, SeriesContext, TimeSeries,
        ValueType,
    },
};

/// Cloud Monitoring accepts at most this many series per write.
pub const MAX_TIME_SERIES_PER_REQUEST: usize = 200;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Runtime settings for one reporter.
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    /// Project id (or `projects/{id}`) all series are written to.
    pub project: String,
    pub interval: Duration,
    /// Failed ticks in a row before the loop stops. `0` never stops.
    pub max_consecutive_errors: u32,
    /// Attached to every series.
    pub labels: BTreeMap<String, String>,
    /// `None` reports against the `global` resource.
    pub resource: Option<MonitoredResource>,
    pub namespace: String,
    /// Declare gauge descriptors before their first write.
    pub declare_descriptors: bool,
    /// Deadline for all of one tick's write requests together.
    pub submit_timeout: Option<Duration>,
}

impl ReporterOptions {
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            interval: DEFAULT_INTERVAL,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            labels: BTreeMap::new(),
            resource: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            declare_descriptors: true,
            submit_timeout: None,
        }
    }

    fn series_context(&self) -> SeriesContext {
        SeriesContext {
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            resource: self.resource.clone().unwrap_or_default(),
        }
    }
}

impl From<&ReporterConfig> for ReporterOptions {
    fn from(config: &ReporterConfig) -> Self {
        Self {
            project: config.project.clone(),
            interval: Duration::from_secs(config.interval_secs),
            max_consecutive_errors: config.max_consecutive_errors,
            labels: config.labels.clone(),
            resource: config
                .resource
                .as_ref()
                .map(|r| MonitoredResource::new(r.resource_type.clone(), r.labels.clone())),
            namespace: config.namespace.clone(),
            declare_descriptors: config.declare_descriptors,
            submit_timeout: config.submit_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Counts failed submissions in a row.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTracker {
    consecutive: u32,
    max: u32,
}

impl ErrorTracker {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            consecutive: 0,
            max,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns the new consecutive count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive
    }

    #[must_use]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    #[must_use]
    pub fn tripped(&self) -> bool {
        self.max > 0 && self.consecutive >= self.max
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to report; no request was made.
    Empty,
    /// The backend accepted `points` series.
    Submitted { points: usize },
    /// The batch could not be built. The error counter is untouched.
    BuildFailed,
    SubmitFailed { consecutive_errors: u32 },
    /// The failure threshold was reached; no further ticks should run.
    Halted { consecutive_errors: u32 },
}

/// Returned by [`Reporter::run`] once the breaker trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halted {
    pub consecutive_errors: u32,
}

/// A rejected write and the request body that caused it.
struct FailedWrite {
    error: Error,
    payload: String,
}

struct SelfMetrics {
    ticks: Arc<Counter>,
    points_submitted: Arc<Counter>,
    submit_errors: Arc<Counter>,
    last_batch_size: Arc<Gauge>,
}

impl SelfMetrics {
    fn register(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            ticks: registry.counter(definitions::reporter::TICKS_TOTAL)?,
            points_submitted: registry.counter(definitions::reporter::POINTS_SUBMITTED_TOTAL)?,
            submit_errors: registry.counter(definitions::reporter::SUBMIT_ERRORS_TOTAL)?,
            last_batch_size: registry.gauge(definitions::reporter::LAST_BATCH_SIZE)?,
        })
    }
}

fn request_payload(series: &[TimeSeries]) -> String {
    serde_json::to_string(&CreateTimeSeriesRequest {
        time_series: series,
    })
    .unwrap_or_else(|e| format!("<unserializable payload: {e}>"))
}

/// Periodically publishes a registry to a monitoring backend.
pub struct Reporter {
    registry: Arc<dyn Registry>,
    backend: Arc<dyn MonitoringBackend>,
    options: ReporterOptions,
    context: SeriesContext,
    errors: ErrorTracker,
    descriptors: DescriptorCache,
    self_metrics: Option<SelfMetrics>,
}

impl Reporter {
    pub fn new(
        registry: Arc<dyn Registry>,
        backend: Arc<dyn MonitoringBackend>,
        options: ReporterOptions,
    ) -> Result<Self> {
        if options.project.trim().is_empty() {
            return Err(Error::message("reporter project must not be empty"));
        }
        if options.interval.is_zero() {
            return Err(Error::message("reporter interval must be greater than zero"));
        }
        Ok(Self {
            registry,
            backend,
            context: options.series_context(),
            errors: ErrorTracker::new(options.max_consecutive_errors),
            descriptors: DescriptorCache::new(),
            self_metrics: None,
            options,
        })
    }

    /// Record the reporter's own activity into `registry`.
    pub fn with_self_metrics(mut self, registry: &MetricsRegistry) -> Result<Self> {
        self.self_metrics = Some(SelfMetrics::register(registry)?);
        Ok(self)
    }

    #[must_use]
    pub fn options(&self) -> &ReporterOptions {
        &self.options
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.errors.consecutive()
    }

    #[must_use]
    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Build one batch stamped `now` and submit it.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let batch = match build_batch(self.registry.as_ref(), now, &self.context) {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to build time series batch, skipping tick");
                return TickOutcome::BuildFailed;
            },
        };
        if batch.is_empty() {
            debug!("no non-zero metrics to report");
            return TickOutcome::Empty;
        }

        if let Some(m) = &self.self_metrics {
            m.ticks.inc(1);
        }
        if self.options.declare_descriptors {
            self.declare_gauges(&batch.gauges).await;
        }

        let points = batch.len();
        match self.submit(&batch.series).await {
            Ok(()) => {
                self.errors.record_success();
                if let Some(m) = &self.self_metrics {
                    m.points_submitted.inc(points as i64);
                    m.last_batch_size.update(points as i64);
                }
                debug!(points, "submitted time series");
                TickOutcome::Submitted { points }
            },
            Err(FailedWrite { error, payload }) => {
                let consecutive_errors = self.errors.record_failure();
                if let Some(m) = &self.self_metrics {
                    m.submit_errors.inc(1);
                }
                error!(
                    error = %error,
                    payload = %payload,
                    consecutive_errors,
                    "failed to send metrics to Cloud Monitoring"
                );
                if self.errors.tripped() {
                    TickOutcome::Halted { consecutive_errors }
                } else {
                    TickOutcome::SubmitFailed { consecutive_errors }
                }
            },
        }
    }

    /// Best-effort declaration of gauge types not yet cached.
    ///
    /// A failed declaration is logged and retried on the next tick; the
    /// point is still written.
    async fn declare_gauges(&mut self, gauges: &[(String, ValueType)]) {
        for (metric_type, value_type) in gauges {
            if self.descriptors.contains(metric_type) {
                continue;
            }
            let descriptor = gauge_descriptor(
                metric_type,
                *value_type,
                self.context.labels.keys().map(String::as_str),
            );
            match self
                .backend
                .create_metric_descriptor(&self.options.project, &descriptor)
                .await
            {
                Ok(()) => {
                    debug!(metric_type = %metric_type, "declared metric descriptor");
                    self.descriptors.insert(metric_type.clone());
                },
                Err(e) => {
                    warn!(metric_type = %metric_type, error = %e, "failed to declare metric descriptor");
                },
            }
        }
    }

    /// Write `series` in chunks, all within `submit_timeout` when set.
    async fn submit(&self, series: &[TimeSeries]) -> std::result::Result<(), FailedWrite> {
        let Some(limit) = self.options.submit_timeout else {
            return self.write_chunks(series).await;
        };
        match tokio::time::timeout(limit, self.write_chunks(series)).await {
            Ok(result) => result,
            Err(_) => Err(FailedWrite {
                error: Error::Timeout(limit),
                payload: request_payload(series),
            }),
        }
    }

    async fn write_chunks(&self, series: &[TimeSeries]) -> std::result::Result<(), FailedWrite> {
        for chunk in series.chunks(MAX_TIME_SERIES_PER_REQUEST) {
            if let Err(error) = self
                .backend
                .create_time_series(&self.options.project, chunk)
                .await
            {
                return Err(FailedWrite {
                    error,
                    payload: request_payload(chunk),
                });
            }
        }
        Ok(())
    }

    /// Tick every `interval` until the breaker trips.
    ///
    /// The first report happens one interval after start. A tick that comes
    /// due while a submission is still in flight is skipped.
    pub async fn run(mut self) -> Halted {
        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        info!(
            project = %self.options.project,
            interval = ?self.options.interval,
            max_consecutive_errors = self.options.max_consecutive_errors,
            "metrics reporter started"
        );

        loop {
            interval.tick().await;
            if let TickOutcome::Halted { consecutive_errors } = self.tick(Utc::now()).await {
                error!("reporter halted after {consecutive_errors} consecutive errors");
                return Halted { consecutive_errors };
            }
        }
    }

    /// Run on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ReporterHandle {
        ReporterHandle {
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a spawned [`Reporter`].
pub struct ReporterHandle {
    task: JoinHandle<Halted>,
}

impl ReporterHandle {
    /// Stop the loop. An in-flight submission is dropped.
    pub fn abort(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the breaker to trip.
    pub async fn wait(self) -> Result<Halted> {
        self.task
            .await
            .map_err(|e| Error::external("reporter task ended abnormally", e))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::backend::MemoryBackend};

    fn reporter_with(
        registry: Arc<MetricsRegistry>,
        backend: Arc<MemoryBackend>,
        max_errors: u32,
    ) -> Reporter {
        let options = ReporterOptions {
            max_consecutive_errors: max_errors,
            ..ReporterOptions::new("test-project")
        };
        Reporter::new(registry, backend, options).unwrap()
    }

    #[test]
    fn tracker_resets_on_success() {
        let mut tracker = ErrorTracker::new(3);
        assert_eq!(tracker.record_failure(), 1);
        assert_eq!(tracker.record_failure(), 2);
        tracker.record_success();
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.tripped());
        tracker.record_failure();
        tracker.record_failure();
        assert!(!tracker.tripped());
        tracker.record_failure();
        assert!(tracker.tripped());
    }

    #[test]
    fn tracker_with_zero_max_never_trips() {
        let mut tracker = ErrorTracker::new(0);
        for _ in 0..100 {
            tracker.record_failure();
        }
        assert!(!tracker.tripped());
    }

    #[test]
    fn rejects_invalid_options() {
        let registry: Arc<dyn Registry> = Arc::new(MetricsRegistry::new());
        let backend: Arc<dyn MonitoringBackend> = Arc::new(MemoryBackend::new());

        let empty_project = ReporterOptions::new("  ");
        assert!(Reporter::new(Arc::clone(&registry), Arc::clone(&backend), empty_project).is_err());

        let zero_interval = ReporterOptions {
            interval: Duration::ZERO,
            ..ReporterOptions::new("p")
        };
        assert!(Reporter::new(registry, backend, zero_interval).is_err());
    }

    #[test]
    fn options_from_config() {
        let config = ReporterConfig {
            project: "proj".into(),
            interval_secs: 15,
            max_consecutive_errors: 5,
            submit_timeout_secs: Some(10),
            resource: Some(cloudmon_config::ResourceConfig {
                resource_type: "gce_instance".into(),
                labels: BTreeMap::from([("zone".to_string(), "us-east1-b".to_string())]),
            }),
            ..ReporterConfig::default()
        };
        let options = ReporterOptions::from(&config);
        assert_eq!(options.interval, Duration::from_secs(15));
        assert_eq!(options.max_consecutive_errors, 5);
        assert_eq!(options.submit_timeout, Some(Duration::from_secs(10)));
        let resource = options.resource.unwrap();
        assert_eq!(resource.resource_type, "gce_instance");
        assert_eq!(resource.labels.get("zone").map(String::as_str), Some("us-east1-b"));
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.counter("idle").unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let mut reporter = reporter_with(registry, Arc::clone(&backend), 3);

        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::Empty);
        assert_eq!(backend.write_attempts(), 0);
    }

    #[tokio::test]
    async fn large_batches_are_chunked() {
        let registry = Arc::new(MetricsRegistry::new());
        for i in 0..450 {
            registry.counter(&format!("c.{i}")).unwrap().inc(1);
        }
        let backend = Arc::new(MemoryBackend::new());
        let mut reporter = reporter_with(registry, Arc::clone(&backend), 3);

        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::Submitted {
            points: 450
        });
        let sizes: Vec<usize> = backend.writes().iter().map(Vec::len).collect();
        assert_eq!(sizes, [200, 200, 50]);
    }

    #[tokio::test]
    async fn gauge_descriptors_are_declared_once() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.gauge("queue.size").unwrap().update(3);
        registry.counter("jobs.done").unwrap().inc(1);
        let backend = Arc::new(MemoryBackend::new());
        let mut reporter = reporter_with(registry, Arc::clone(&backend), 3);

        reporter.tick(Utc::now()).await;
        reporter.tick(Utc::now()).await;

        let declared = backend.descriptors();
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].metric_type, "custom.googleapis.com/queue/size");
        assert_eq!(declared[0].value_type, ValueType::Int64);
        assert_eq!(reporter.descriptors().len(), 1);
    }

    #[tokio::test]
    async fn failed_declaration_is_retried_and_point_still_written() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.gauge_f64("cpu.load").unwrap().update(0.5);
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_declarations(1);
        let mut reporter = reporter_with(registry, Arc::clone(&backend), 3);

        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::Submitted {
            points: 1
        });
        assert!(reporter.descriptors().is_empty());
        assert_eq!(backend.writes().len(), 1);

        reporter.tick(Utc::now()).await;
        assert!(reporter.descriptors().contains("custom.googleapis.com/cpu/load"));
    }

    #[tokio::test]
    async fn self_metrics_track_activity() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.counter("jobs.done").unwrap().inc(2);
        let backend = Arc::new(MemoryBackend::new());
        let mut reporter = reporter_with(Arc::clone(&registry), Arc::clone(&backend), 3)
            .with_self_metrics(&registry)
            .unwrap();

        reporter.tick(Utc::now()).await;
        backend.fail_next_writes(1);
        reporter.tick(Utc::now()).await;

        let ticks = registry.counter(definitions::reporter::TICKS_TOTAL).unwrap();
        let errors = registry
            .counter(definitions::reporter::SUBMIT_ERRORS_TOTAL)
            .unwrap();
        let points = registry
            .counter(definitions::reporter::POINTS_SUBMITTED_TOTAL)
            .unwrap();
        // Both ticks built a batch; only the first was accepted.
        assert_eq!(ticks.count(), 2);
        assert_eq!(errors.count(), 1);
        assert_eq!(points.count(), 1);
    }

    struct SlowBackend(Duration);

    #[async_trait::async_trait]
    impl MonitoringBackend for SlowBackend {
        async fn create_time_series(&self, _: &str, _: &[TimeSeries]) -> Result<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }

        async fn create_metric_descriptor(
            &self,
            _: &str,
            _: &crate::timeseries::MetricDescriptor,
        ) -> Result<()> {
            Ok(())
        }

        async fn list_metric_descriptors(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<Vec<crate::timeseries::MetricDescriptor>> {
            Ok(Vec::new())
        }

        async fn delete_metric_descriptor(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submit_timeout_counts_as_failure() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.counter("jobs.done").unwrap().inc(1);
        let options = ReporterOptions {
            submit_timeout: Some(Duration::from_secs(5)),
            ..ReporterOptions::new("p")
        };
        let backend = Arc::new(SlowBackend(Duration::from_secs(60)));
        let mut reporter = Reporter::new(registry, backend, options).unwrap();

        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::SubmitFailed {
            consecutive_errors: 1
        });
    }

    #[tokio::test(start_paused = true)]
    async fn submit_timeout_covers_all_chunks() {
        let registry = Arc::new(MetricsRegistry::new());
        for i in 0..450 {
            registry.counter(&format!("c.{i}")).unwrap().inc(1);
        }
        let options = ReporterOptions {
            submit_timeout: Some(Duration::from_secs(5)),
            ..ReporterOptions::new("p")
        };
        // Each chunk alone fits the deadline, three of them do not.
        let backend = Arc::new(SlowBackend(Duration::from_secs(3)));
        let mut reporter = Reporter::new(registry, backend, options).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::SubmitFailed {
            consecutive_errors: 1
        });
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn declared_gauges_list_configured_label_keys() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.gauge("queue.size").unwrap().update(3);
        let backend = Arc::new(MemoryBackend::new());
        let options = ReporterOptions {
            labels: BTreeMap::from([
                ("source".to_string(), "host-1".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]),
            ..ReporterOptions::new("p")
        };
        let mut reporter = Reporter::new(registry, Arc::clone(&backend) as _, options).unwrap();

        assert_eq!(reporter.tick(Utc::now()).await, TickOutcome::Submitted {
            points: 1
        });

        let declared = backend.descriptors();
        assert_eq!(declared.len(), 1);
        let declared_keys: Vec<&str> = declared[0].labels.iter().map(|l| l.key.as_str()).collect();
        let writes = backend.writes();
        let series_keys: Vec<&str> = writes[0][0].metric.labels.keys().map(String::as_str).collect();
        assert_eq!(declared_keys, series_keys);
        assert_eq!(declared_keys, ["env", "source"]);
    }
}
