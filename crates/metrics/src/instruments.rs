//! Single-value instruments: counters, gauges, histograms and timers.

use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Monotonic-ish event counter. May be decremented.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Integer gauge holding the last value set.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Floating point gauge. The value is stored as raw `f64` bits.
#[derive(Debug, Default)]
pub struct GaugeF64 {
    bits: AtomicU64,
}

impl GaugeF64 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Distribution of integer samples.
///
/// Only the sample count and running sum are kept; the reporter does not
/// export distributions.
#[derive(Debug, Default)]
pub struct Histogram {
    count: AtomicI64,
    sum: AtomicI64,
}

impl Histogram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, sample: i64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(sample, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sum(&self) -> i64 {
        self.sum.load(Ordering::Relaxed)
    }
}

/// Records how long things take.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicI64,
    total_nanos: AtomicU64,
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Run `f` and record its wall-clock duration.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.update(start.elapsed());
        out
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_inc_dec_clear() {
        let c = Counter::new();
        c.inc(5);
        c.dec(2);
        assert_eq!(c.count(), 3);
        c.clear();
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn gauge_f64_round_trips_bits() {
        let g = GaugeF64::new();
        assert_eq!(g.value(), 0.0);
        g.update(-1.25);
        assert_eq!(g.value(), -1.25);
    }

    #[test]
    fn histogram_counts_samples() {
        let h = Histogram::new();
        h.update(10);
        h.update(32);
        assert_eq!(h.count(), 2);
        assert_eq!(h.sum(), 42);
    }

    #[test]
    fn timer_time_records_once() {
        let t = Timer::new();
        let v = t.time(|| 7);
        assert_eq!(v, 7);
        assert_eq!(t.count(), 1);
    }
}
