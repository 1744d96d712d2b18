use {
    anyhow::Result,
    cloudmon_reporter::{MonitoringBackend, metric_type},
    tracing::{error, info},
};

/// Descriptors created by cloudmon under the default namespace.
pub const DEFAULT_FILTER: &str = r#"metric.type = starts_with("custom.googleapis.com/")"#;

pub async fn list(backend: &dyn MonitoringBackend, project: &str, filter: &str) -> Result<()> {
    let filter = Some(filter).filter(|f| !f.trim().is_empty());
    let descriptors = backend.list_metric_descriptors(project, filter).await?;
    info!(count = descriptors.len(), "listed metric descriptors");
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

/// Delete each metric, carrying on past failures.
///
/// Fails if any deletion failed.
pub async fn delete(
    backend: &dyn MonitoringBackend,
    project: &str,
    namespace: &str,
    metrics: &[String],
) -> Result<()> {
    let mut failed = 0usize;
    for metric in metrics {
        let full_type = qualify(namespace, metric);
        match backend.delete_metric_descriptor(project, &full_type).await {
            Ok(()) => info!(metric = %full_type, "deleted metric descriptor"),
            Err(e) => {
                error!(metric = %full_type, error = %e, "failed to delete metric descriptor");
                failed += 1;
            },
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} deletions failed", metrics.len());
    }
    Ok(())
}

/// Full metric type for either a qualified type or a registry name.
fn qualify(namespace: &str, metric: &str) -> String {
    if metric.contains('/') {
        metric.to_string()
    } else {
        metric_type(namespace, metric)
    }
}
