//! Assembles the time series for one tick.

use {
    chrono::{DateTime, Utc},
    cloudmon_metrics::{Instrument, Registry},
};

use crate::{
    error::Result,
    extract::extract,
    timeseries::{SeriesContext, TimeSeries, ValueType, build_time_series},
};

/// Output of one registry scan.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Every point for this tick, in no particular order.
    pub series: Vec<TimeSeries>,
    /// Gauge metric types emitted this tick, for descriptor declaration.
    pub gauges: Vec<(String, ValueType)>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Scan `registry` and build every point for the tick at `now`.
///
/// Never fails today; the `Result` carries batch-level validation errors,
/// which skip the tick without counting as a submission failure.
pub fn build_batch(
    registry: &dyn Registry,
    now: DateTime<Utc>,
    ctx: &SeriesContext,
) -> Result<Batch> {
    let mut batch = Batch::default();
    registry.each(&mut |name, instrument| {
        let is_gauge = matches!(instrument, Instrument::Gauge(_) | Instrument::GaugeF64(_));
        for sample in extract(name, instrument) {
            let series = build_time_series(name, &sample, now, ctx);
            if is_gauge {
                batch
                    .gauges
                    .push((series.metric.metric_type.clone(), series.value_type));
            }
            batch.series.push(series);
        }
    });
    Ok(batch)
}
