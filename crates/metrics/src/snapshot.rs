//! Immutable views of instrument state.

use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Kind of instrument held in a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Counter,
    Gauge,
    GaugeF64,
    Meter,
    Histogram,
    Timer,
    Other,
}

impl InstrumentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::GaugeF64 => "gauge_f64",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a [`Meter`](crate::Meter).
///
/// All five fields are captured under the same lock, so a snapshot never
/// mixes a count from one instant with rates from another.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeterSnapshot {
    /// Total number of marked events.
    pub count: i64,
    /// Events per second since the meter was created.
    pub rate_mean: f64,
    /// One-minute exponentially weighted rate, per second.
    pub rate1: f64,
    /// Five-minute exponentially weighted rate, per second.
    pub rate5: f64,
    /// Fifteen-minute exponentially weighted rate, per second.
    pub rate15: f64,
}

impl MeterSnapshot {
    #[must_use]
    pub fn new(count: i64, rate_mean: f64, rate1: f64, rate5: f64, rate15: f64) -> Self {
        Self {
            count,
            rate_mean,
            rate1,
            rate5,
            rate15,
        }
    }
}
