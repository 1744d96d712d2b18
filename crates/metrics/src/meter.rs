//! Event-rate meter with exponentially weighted moving averages.
//!
//! Rates are decayed lazily: every mark or snapshot first catches up on the
//! 5-second ticks that elapsed since the last one, so no background thread is
//! needed.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::snapshot::MeterSnapshot;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Idle meters past this many ticks have every window reset to zero instead of
/// being decayed tick by tick.
const MAX_CATCH_UP_TICKS: u64 = 720;

#[derive(Debug, Clone, Copy)]
struct Ewma {
    alpha: f64,
    /// Events per second.
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn with_window(minutes: f64) -> Self {
        let interval = TICK_INTERVAL.as_secs_f64();
        Self {
            alpha: 1.0 - (-interval / 60.0 / minutes).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, events: i64) {
        let instant_rate = events as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    fn reset(&mut self) {
        self.rate = 0.0;
        self.initialized = true;
    }
}

#[derive(Debug)]
struct MeterState {
    count: i64,
    uncounted: i64,
    start: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            uncounted: 0,
            start: now,
            last_tick: now,
            m1: Ewma::with_window(1.0),
            m5: Ewma::with_window(5.0),
            m15: Ewma::with_window(15.0),
        }
    }

    fn tick_if_necessary(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        if ticks == 0 {
            return;
        }
        self.last_tick += TICK_INTERVAL * u32::try_from(ticks).unwrap_or(u32::MAX);

        let pending = std::mem::take(&mut self.uncounted);
        if ticks > MAX_CATCH_UP_TICKS {
            self.m1.reset();
            self.m5.reset();
            self.m15.reset();
            return;
        }
        for i in 0..ticks {
            let events = if i == 0 { pending } else { 0 };
            self.m1.tick(events);
            self.m5.tick(events);
            self.m15.tick(events);
        }
    }

    fn snapshot(&self, now: Instant) -> MeterSnapshot {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };
        MeterSnapshot {
            count: self.count,
            rate_mean,
            rate1: self.m1.rate,
            rate5: self.m5.rate,
            rate15: self.m15.rate,
        }
    }
}

/// Counts events and tracks their rate over 1, 5 and 15 minute windows.
#[derive(Debug)]
pub struct Meter {
    state: Mutex<MeterState>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    #[must_use]
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    fn started_at(now: Instant) -> Self {
        Self {
            state: Mutex::new(MeterState::new(now)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `n` events.
    pub fn mark(&self, n: i64) {
        self.mark_at(n, Instant::now());
    }

    fn mark_at(&self, n: i64, now: Instant) {
        let mut state = self.lock();
        state.tick_if_necessary(now);
        state.count += n;
        state.uncounted += n;
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.lock().count
    }

    /// Consistent copy of count and all rates.
    #[must_use]
    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> MeterSnapshot {
        let mut state = self.lock();
        state.tick_if_necessary(now);
        state.snapshot(now)
    }
}
