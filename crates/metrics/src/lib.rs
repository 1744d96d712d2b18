//! In-process metrics registry for cloudmon.
//!
//! Instruments are cheap, thread-safe handles (`Arc`s) that the application
//! updates from any thread. The [`Registry`] trait is the read side consumed
//! by the reporter: it enumerates every `(name, instrument)` pair in no
//! particular order.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cloudmon_metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new();
//! registry.counter("jobs.done")?.inc(1);
//! registry.gauge("queue.size")?.update(12);
//! registry.meter("http.requests")?.mark(1);
//! ```

pub mod definitions;
mod error;
mod instruments;
mod meter;
mod registry;
mod snapshot;

pub use {
    error::{Error, Result},
    instruments::{Counter, Gauge, GaugeF64, Histogram, Timer},
    meter::Meter,
    registry::{Instrument, MetricsRegistry, Registry},
    snapshot::{InstrumentKind, MeterSnapshot},
};
