//! Monitoring backend abstraction.
//!
//! [`HttpBackend`](crate::http::HttpBackend) talks to the Cloud Monitoring
//! REST API. [`MemoryBackend`] keeps everything in process and can be told to
//! fail, for tests and dry runs.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use {async_trait::async_trait, tracing::debug};

use crate::{
    error::{Error, Result},
    timeseries::{MetricDescriptor, TimeSeries},
};

/// Write and administration endpoints of a time series backend.
///
/// A write either accepts the whole slice or fails as a whole.
#[async_trait]
pub trait MonitoringBackend: Send + Sync {
    /// Write one point per series.
    async fn create_time_series(&self, project: &str, series: &[TimeSeries]) -> Result<()>;

    /// Declare a metric type. Declaring an existing type is not an error.
    async fn create_metric_descriptor(
        &self,
        project: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<()>;

    /// List metric descriptors, optionally restricted by a backend filter.
    async fn list_metric_descriptors(
        &self,
        project: &str,
        filter: Option<&str>,
    ) -> Result<Vec<MetricDescriptor>>;

    /// Delete the descriptor for `metric_type` and all of its data.
    async fn delete_metric_descriptor(&self, project: &str, metric_type: &str) -> Result<()>;
}

/// `projects/{id}` for either a bare project id or an already-qualified name.
#[must_use]
pub fn project_name(project: &str) -> String {
    if project.starts_with("projects/") {
        project.to_string()
    } else {
        format!("projects/{project}")
    }
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    writes: Mutex<Vec<Vec<TimeSeries>>>,
    descriptors: Mutex<BTreeMap<String, MetricDescriptor>>,
    write_attempts: AtomicUsize,
    failing_writes: AtomicUsize,
    failing_declarations: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one unit of a failure budget. `usize::MAX` never runs out.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            usize::MAX => Some(usize::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make every write fail until [`fail_next_writes`](Self::fail_next_writes)
    /// resets the budget.
    pub fn fail_all_writes(&self) {
        self.failing_writes.store(usize::MAX, Ordering::SeqCst);
    }

    /// Make the next `n` descriptor declarations fail.
    pub fn fail_next_declarations(&self, n: usize) {
        self.failing_declarations.store(n, Ordering::SeqCst);
    }

    /// Accepted writes, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<TimeSeries>> {
        lock(&self.writes).clone()
    }

    /// Every write call, accepted or not.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        lock(&self.descriptors).values().cloned().collect()
    }
}

#[async_trait]
impl MonitoringBackend for MemoryBackend {
    async fn create_time_series(&self, project: &str, series: &[TimeSeries]) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_writes) {
            return Err(Error::Api {
                status: 503,
                message: "injected write failure".into(),
            });
        }
        debug!(project, count = series.len(), "stored time series in memory");
        lock(&self.writes).push(series.to_vec());
        Ok(())
    }

    async fn create_metric_descriptor(
        &self,
        _project: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<()> {
        if take_failure(&self.failing_declarations) {
            return Err(Error::Api {
                status: 500,
                message: "injected descriptor failure".into(),
            });
        }
        lock(&self.descriptors)
            .entry(descriptor.metric_type.clone())
            .or_insert_with(|| descriptor.clone());
        Ok(())
    }

    async fn list_metric_descriptors(
        &self,
        _project: &str,
        filter: Option<&str>,
    ) -> Result<Vec<MetricDescriptor>> {
        // Only plain prefix filters are understood in memory.
        let prefix = filter.unwrap_or_default();
        Ok(lock(&self.descriptors)
            .values()
            .filter(|d| d.metric_type.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_metric_descriptor(&self, _project: &str, metric_type: &str) -> Result<()> {
        match lock(&self.descriptors).remove(metric_type) {
            Some(_) => Ok(()),
            None => Err(Error::Api {
                status: 404,
                message: format!("metric descriptor {metric_type} not found"),
            }),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{descriptors::gauge_descriptor, timeseries::ValueType},
    };

    #[test]
    fn project_name_is_qualified_once() {
        assert_eq!(project_name("my-proj"), "projects/my-proj");
        assert_eq!(project_name("projects/my-proj"), "projects/my-proj");
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let backend = MemoryBackend::new();
        backend.fail_next_writes(2);

        assert!(backend.create_time_series("p", &[]).await.is_err());
        assert!(backend.create_time_series("p", &[]).await.is_err());
        assert!(backend.create_time_series("p", &[]).await.is_ok());
        assert_eq!(backend.write_attempts(), 3);
        assert_eq!(backend.writes().len(), 1);
    }

    #[tokio::test]
    async fn fail_all_never_runs_out() {
        let backend = MemoryBackend::new();
        backend.fail_all_writes();
        for _ in 0..10 {
            assert!(backend.create_time_series("p", &[]).await.is_err());
        }
        backend.fail_next_writes(0);
        assert!(backend.create_time_series("p", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn descriptor_admin_round_trip() {
        let backend = MemoryBackend::new();
        let d = gauge_descriptor("custom.googleapis.com/queue/size", ValueType::Int64, []);
        backend.create_metric_descriptor("p", &d).await.unwrap();
        backend.create_metric_descriptor("p", &d).await.unwrap();

        let listed = backend
            .list_metric_descriptors("p", Some("custom.googleapis.com/"))
            .await
            .unwrap();
        assert_eq!(listed, vec![d.clone()]);

        backend
            .delete_metric_descriptor("p", &d.metric_type)
            .await
            .unwrap();
        assert!(backend.descriptors().is_empty());
        assert!(
            backend
                .delete_metric_descriptor("p", &d.metric_type)
                .await
                .is_err()
        );
    }
}
