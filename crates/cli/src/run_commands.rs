use std::{future::Future, sync::Arc, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    cloudmon_config::CloudmonConfig,
    cloudmon_metrics::{Gauge, MetricsRegistry, definitions},
    cloudmon_reporter::{
        MonitoringBackend, Reporter, ReporterOptions,
        timeseries::{MetricDescriptor, TimeSeries},
    },
    tokio::time::{Instant, MissedTickBehavior},
    tracing::info,
};

const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Prints time series to stdout instead of writing them.
struct StdoutBackend;

#[async_trait]
impl MonitoringBackend for StdoutBackend {
    async fn create_time_series(
        &self,
        _project: &str,
        series: &[TimeSeries],
    ) -> cloudmon_reporter::Result<()> {
        for s in series {
            println!("{}", serde_json::to_string(s)?);
        }
        Ok(())
    }

    async fn create_metric_descriptor(
        &self,
        _project: &str,
        descriptor: &MetricDescriptor,
    ) -> cloudmon_reporter::Result<()> {
        info!(metric = %descriptor.metric_type, "would declare metric descriptor");
        Ok(())
    }

    async fn list_metric_descriptors(
        &self,
        _project: &str,
        _filter: Option<&str>,
    ) -> cloudmon_reporter::Result<Vec<MetricDescriptor>> {
        Ok(Vec::new())
    }

    async fn delete_metric_descriptor(
        &self,
        _project: &str,
        _metric_type: &str,
    ) -> cloudmon_reporter::Result<()> {
        Ok(())
    }
}

/// Report the process's own metrics until Ctrl-C or the breaker trips.
pub async fn run(config: &CloudmonConfig, dry_run: bool) -> Result<()> {
    let mut options = ReporterOptions::from(&config.reporter);
    let backend: Arc<dyn MonitoringBackend> = if dry_run {
        if options.project.trim().is_empty() {
            options.project = "dry-run".into();
        }
        Arc::new(StdoutBackend)
    } else {
        crate::require_project(config)?;
        Arc::new(crate::http_backend(config)?)
    };

    let registry = Arc::new(MetricsRegistry::new());
    let uptime = registry.gauge(definitions::process::UPTIME_SECONDS)?;
    let reporter = Reporter::new(Arc::clone(&registry) as _, backend, options)?
        .with_self_metrics(&registry)?;

    report_until(reporter, uptime, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("interrupted, stopping reporter");
    })
    .await
}

async fn report_until(
    reporter: Reporter,
    uptime: Arc<Gauge>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let started = Instant::now();
    let uptime_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            uptime.update(i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX));
        }
    });

    let outcome = tokio::select! {
        halted = reporter.run() => Err(anyhow::anyhow!(
            "reporter halted after {} consecutive errors",
            halted.consecutive_errors
        )),
        () = shutdown => Ok(()),
    };
    uptime_task.abort();
    outcome
}
