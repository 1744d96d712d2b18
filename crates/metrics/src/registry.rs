//! Named instrument registry.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    instruments::{Counter, Gauge, GaugeF64, Histogram, Timer},
    meter::Meter,
    snapshot::InstrumentKind,
};

/// A registered instrument.
///
/// New kinds may be added; consumers outside this crate must keep a
/// catch-all arm.
#[derive(Clone)]
#[non_exhaustive]
pub enum Instrument {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    GaugeF64(Arc<GaugeF64>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    /// Application-defined value the registry only stores and prints.
    Other(Arc<dyn fmt::Debug + Send + Sync>),
}

impl Instrument {
    #[must_use]
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Self::Counter(_) => InstrumentKind::Counter,
            Self::Gauge(_) => InstrumentKind::Gauge,
            Self::GaugeF64(_) => InstrumentKind::GaugeF64,
            Self::Meter(_) => InstrumentKind::Meter,
            Self::Histogram(_) => InstrumentKind::Histogram,
            Self::Timer(_) => InstrumentKind::Timer,
            Self::Other(_) => InstrumentKind::Other,
        }
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter(c) => f.debug_tuple("Counter").field(&c.count()).finish(),
            Self::Gauge(g) => f.debug_tuple("Gauge").field(&g.value()).finish(),
            Self::GaugeF64(g) => f.debug_tuple("GaugeF64").field(&g.value()).finish(),
            Self::Meter(m) => f.debug_tuple("Meter").field(&m.count()).finish(),
            Self::Histogram(h) => f.debug_tuple("Histogram").field(&h.count()).finish(),
            Self::Timer(t) => f.debug_tuple("Timer").field(&t.count()).finish(),
            Self::Other(v) => f.debug_tuple("Other").field(v).finish(),
        }
    }
}

/// Read side of a metrics registry, as consumed by the reporter.
pub trait Registry: Send + Sync {
    /// Visit every registered instrument. Order is unspecified.
    fn each(&self, f: &mut dyn FnMut(&str, &Instrument));

    /// Look up a single instrument by name.
    fn get(&self, name: &str) -> Option<Instrument>;
}

/// Thread-safe map from dot-separated metric names to instruments.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Instrument>>,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instrument` under `name`. Fails if the name is taken.
    pub fn register(&self, name: impl Into<String>, instrument: Instrument) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if metrics.contains_key(&name) {
            return Err(Error::DuplicateMetric { name });
        }
        debug!(metric = %name, kind = %instrument.kind(), "registered metric");
        metrics.insert(name, instrument);
        Ok(())
    }

    /// Return the instrument under `name`, registering `make()` if absent.
    pub fn get_or_register(
        &self,
        name: &str,
        make: impl FnOnce() -> Instrument,
    ) -> Result<Instrument> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        Ok(metrics.entry(name.to_string()).or_insert_with(make).clone())
    }

    /// Remove `name`. Returns the instrument that was registered, if any.
    pub fn unregister(&self, name: &str) -> Option<Instrument> {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        match self.get_or_register(name, || Instrument::Counter(Arc::default()))? {
            Instrument::Counter(c) => Ok(c),
            other => Err(mismatch(name, InstrumentKind::Counter, &other)),
        }
    }

    pub fn gauge(&self, name: &str) -> Result<Arc<Gauge>> {
        match self.get_or_register(name, || Instrument::Gauge(Arc::default()))? {
            Instrument::Gauge(g) => Ok(g),
            other => Err(mismatch(name, InstrumentKind::Gauge, &other)),
        }
    }

    pub fn gauge_f64(&self, name: &str) -> Result<Arc<GaugeF64>> {
        match self.get_or_register(name, || Instrument::GaugeF64(Arc::default()))? {
            Instrument::GaugeF64(g) => Ok(g),
            other => Err(mismatch(name, InstrumentKind::GaugeF64, &other)),
        }
    }

    pub fn meter(&self, name: &str) -> Result<Arc<Meter>> {
        match self.get_or_register(name, || Instrument::Meter(Arc::default()))? {
            Instrument::Meter(m) => Ok(m),
            other => Err(mismatch(name, InstrumentKind::Meter, &other)),
        }
    }

    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>> {
        match self.get_or_register(name, || Instrument::Histogram(Arc::default()))? {
            Instrument::Histogram(h) => Ok(h),
            other => Err(mismatch(name, InstrumentKind::Histogram, &other)),
        }
    }

    pub fn timer(&self, name: &str) -> Result<Arc<Timer>> {
        match self.get_or_register(name, || Instrument::Timer(Arc::default()))? {
            Instrument::Timer(t) => Ok(t),
            other => Err(mismatch(name, InstrumentKind::Timer, &other)),
        }
    }
}

fn mismatch(name: &str, expected: InstrumentKind, found: &Instrument) -> Error {
    Error::KindMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

impl Registry for MetricsRegistry {
    fn each(&self, f: &mut dyn FnMut(&str, &Instrument)) {
        // Copy the handles out so callbacks may touch the registry.
        let entries: Vec<(String, Instrument)> = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, instrument)| (name.clone(), instrument.clone()))
            .collect();
        for (name, instrument) in &entries {
            f(name, instrument);
        }
    }

    fn get(&self, name: &str) -> Option<Instrument> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn each(&self, f: &mut dyn FnMut(&str, &Instrument)) {
        (**self).each(f);
    }

    fn get(&self, name: &str) -> Option<Instrument> {
        (**self).get(name)
    }
}
