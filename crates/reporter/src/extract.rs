//! Per-kind value extraction.
//!
//! Turns one registry instrument into zero or more `(suffix, value)` samples.
//! Exact zeros are never emitted so idle instruments do not create metric
//! types on the backend.
//! NaN and infinite doubles are dropped as well: one of them invalidates the
//! whole write request.

use {
    cloudmon_metrics::{Instrument, MeterSnapshot},
    tracing::warn,
};

use crate::{
    diagnostics::{HISTOGRAMS_UNSUPPORTED, OneTimeWarning, TIMERS_UNSUPPORTED},
    timeseries::TypedValue,
};

pub const METER_COUNT_SUFFIX: &str = ".count";
pub const METER_MEAN_SUFFIX: &str = ".mean";
pub const METER_RATE1_SUFFIX: &str = ".1min";
pub const METER_RATE5_SUFFIX: &str = ".5min";
pub const METER_RATE15_SUFFIX: &str = ".15min";

const MAX_SAMPLES: usize = 5;

/// One extracted value, appended to the registry name via `suffix`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub suffix: &'static str,
    pub value: TypedValue,
}

/// Which fire-once flags report unsupported kinds.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedWarnings<'a> {
    pub histograms: &'a OneTimeWarning,
    pub timers: &'a OneTimeWarning,
}

impl UnsupportedWarnings<'static> {
    /// The process-wide flags.
    pub const PROCESS: Self = Self {
        histograms: &HISTOGRAMS_UNSUPPORTED,
        timers: &TIMERS_UNSUPPORTED,
    };
}

/// Samples for one instrument.
pub type Samples = std::iter::Flatten<std::array::IntoIter<Option<Sample>, MAX_SAMPLES>>;

/// Extract the samples `instrument` contributes to the current tick.
pub fn extract(name: &str, instrument: &Instrument) -> Samples {
    extract_with(name, instrument, UnsupportedWarnings::PROCESS)
}

/// [`extract`] with explicit diagnostic flags.
pub fn extract_with(name: &str, instrument: &Instrument, warnings: UnsupportedWarnings<'_>) -> Samples {
    let slots = match instrument {
        Instrument::Counter(counter) => {
            single(reportable(name, "", TypedValue::Int64Value(counter.count())))
        },
        Instrument::Gauge(gauge) => {
            single(reportable(name, "", TypedValue::Int64Value(gauge.value())))
        },
        Instrument::GaugeF64(gauge) => {
            single(reportable(name, "", TypedValue::DoubleValue(gauge.value())))
        },
        Instrument::Meter(meter) => meter_samples(name, &meter.snapshot()),
        Instrument::Histogram(histogram) => {
            if histogram.count() > 0 {
                warnings.histograms.fire(|| {
                    warn!(
                        metric = %name,
                        "histograms have no Cloud Monitoring custom metric value type; \
                         all histograms will be skipped"
                    );
                });
            }
            empty()
        },
        Instrument::Timer(timer) => {
            if timer.count() > 0 {
                warnings.timers.fire(|| {
                    warn!(metric = %name, "timers are not implemented yet; all timers will be skipped");
                });
            }
            empty()
        },
        Instrument::Other(value) => {
            warn!(metric = %name, value = ?value, "unknown metric kind, skipping");
            empty()
        },
        unknown => {
            warn!(metric = %name, value = ?unknown, "unknown metric kind, skipping");
            empty()
        },
    };
    slots.into_iter().flatten()
}

/// Meter samples from an already-taken snapshot.
fn meter_samples(name: &str, snap: &MeterSnapshot) -> [Option<Sample>; MAX_SAMPLES] {
    [
        reportable(name, METER_COUNT_SUFFIX, TypedValue::Int64Value(snap.count)),
        reportable(name, METER_MEAN_SUFFIX, TypedValue::DoubleValue(snap.rate_mean)),
        reportable(name, METER_RATE1_SUFFIX, TypedValue::DoubleValue(snap.rate1)),
        reportable(name, METER_RATE5_SUFFIX, TypedValue::DoubleValue(snap.rate5)),
        reportable(name, METER_RATE15_SUFFIX, TypedValue::DoubleValue(snap.rate15)),
    ]
}

/// Drops exact zeros, and NaN or infinite values the API cannot encode.
fn reportable(name: &str, suffix: &'static str, value: TypedValue) -> Option<Sample> {
    if let TypedValue::DoubleValue(v) = value
        && !v.is_finite()
    {
        warn!(metric = %name, suffix, value = %v, "skipping non-finite metric value");
        return None;
    }
    (!value.is_zero()).then_some(Sample { suffix, value })
}

fn single(sample: Option<Sample>) -> [Option<Sample>; MAX_SAMPLES] {
    [sample, None, None, None, None]
}

fn empty() -> [Option<Sample>; MAX_SAMPLES] {
    [None; MAX_SAMPLES]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        cloudmon_metrics::{Counter, Gauge, GaugeF64, Histogram, Timer},
        rstest::rstest,
    };

    use super::*;

    fn collect(instrument: &Instrument) -> Vec<Sample> {
        extract("m", instrument).collect()
    }

    fn counter(n: i64) -> Instrument {
        let c = Counter::new();
        c.inc(n);
        Instrument::Counter(Arc::new(c))
    }

    fn gauge(v: i64) -> Instrument {
        let g = Gauge::new();
        g.update(v);
        Instrument::Gauge(Arc::new(g))
    }

    fn gauge_f64(v: f64) -> Instrument {
        let g = GaugeF64::new();
        g.update(v);
        Instrument::GaugeF64(Arc::new(g))
    }

    #[rstest]
    #[case(counter(0))]
    #[case(gauge(0))]
    #[case(gauge_f64(0.0))]
    fn zero_values_are_suppressed(#[case] instrument: Instrument) {
        assert!(collect(&instrument).is_empty());
    }

    #[rstest]
    #[case(gauge_f64(f64::NAN))]
    #[case(gauge_f64(f64::INFINITY))]
    #[case(gauge_f64(f64::NEG_INFINITY))]
    fn non_finite_values_are_dropped(#[case] instrument: Instrument) {
        assert!(collect(&instrument).is_empty());
    }

    #[test]
    fn meter_drops_only_non_finite_windows() {
        let snap = MeterSnapshot::new(4, f64::NAN, 0.5, f64::INFINITY, 0.25);
        let suffixes: Vec<&str> = meter_samples("m", &snap)
            .into_iter()
            .flatten()
            .map(|s| s.suffix)
            .collect();
        assert_eq!(suffixes, [".count", ".1min", ".15min"]);
    }

    #[rstest]
    #[case(counter(7), TypedValue::Int64Value(7))]
    #[case(counter(-3), TypedValue::Int64Value(-3))]
    #[case(gauge(12), TypedValue::Int64Value(12))]
    #[case(gauge_f64(0.25), TypedValue::DoubleValue(0.25))]
    fn single_value_kinds_emit_one_sample(#[case] instrument: Instrument, #[case] expected: TypedValue) {
        assert_eq!(collect(&instrument), vec![Sample {
            suffix: "",
            value: expected,
        }]);
    }

    #[test]
    fn meter_suppresses_each_zero_window_independently() {
        let snap = MeterSnapshot::new(5, 1.2, 0.0, 3.4, 0.0);
        let samples: Vec<Sample> = meter_samples("m", &snap).into_iter().flatten().collect();
        assert_eq!(samples, vec![
            Sample {
                suffix: ".count",
                value: TypedValue::Int64Value(5),
            },
            Sample {
                suffix: ".mean",
                value: TypedValue::DoubleValue(1.2),
            },
            Sample {
                suffix: ".5min",
                value: TypedValue::DoubleValue(3.4),
            },
        ]);
    }

    #[test]
    fn meter_with_all_windows_emits_five() {
        let snap = MeterSnapshot::new(1, 0.1, 0.2, 0.3, 0.4);
        let suffixes: Vec<&str> = meter_samples("m", &snap)
            .into_iter()
            .flatten()
            .map(|s| s.suffix)
            .collect();
        assert_eq!(suffixes, [".count", ".mean", ".1min", ".5min", ".15min"]);
    }

    #[test]
    fn idle_meter_emits_nothing() {
        let instrument = Instrument::Meter(Arc::default());
        assert!(collect(&instrument).is_empty());
    }

    #[test]
    fn histogram_warns_once_and_emits_nothing() {
        let histograms = OneTimeWarning::new();
        let timers = OneTimeWarning::new();
        let warnings = UnsupportedWarnings {
            histograms: &histograms,
            timers: &timers,
        };

        let idle = Instrument::Histogram(Arc::default());
        assert_eq!(extract_with("h", &idle, warnings).count(), 0);
        assert!(!histograms.has_fired());

        let h = Histogram::new();
        h.update(3);
        let busy = Instrument::Histogram(Arc::new(h));
        for _ in 0..3 {
            assert_eq!(extract_with("h", &busy, warnings).count(), 0);
        }
        assert!(histograms.has_fired());
        assert!(!timers.has_fired());
    }

    #[test]
    fn timer_warns_only_when_used() {
        let histograms = OneTimeWarning::new();
        let timers = OneTimeWarning::new();
        let warnings = UnsupportedWarnings {
            histograms: &histograms,
            timers: &timers,
        };

        assert_eq!(extract_with("t", &Instrument::Timer(Arc::default()), warnings).count(), 0);
        assert!(!timers.has_fired());

        let t = Timer::new();
        t.update(std::time::Duration::from_millis(5));
        assert_eq!(extract_with("t", &Instrument::Timer(Arc::new(t)), warnings).count(), 0);
        assert!(timers.has_fired());
        assert!(!histograms.has_fired());
    }

    #[test]
    fn other_kinds_are_skipped() {
        let instrument = Instrument::Other(Arc::new(vec![1, 2, 3]));
        assert!(collect(&instrument).is_empty());
    }
}
