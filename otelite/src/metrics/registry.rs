use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, mem,
    sync::{Arc, Mutex, RwLock},
    time::SystemTime,
};

use crate::{otel_debug, otel_warn, KeyValue};

use super::data::{Metric, Snapshot};
use super::instrument::{
    validate_instrument_name, validate_instrument_unit, Counter, Histogram, Instrument,
    InstrumentBuilder, InstrumentKind, ObservableCounter, UpDownCounter,
    DEFAULT_HISTOGRAM_BOUNDARIES,
};
use super::{MetricError, MetricResult, Temporality};

type Callback = Box<dyn Fn(&Observer<'_>) + Send + Sync + 'static>;

/// Creates instruments, stores their series and produces [Snapshot]s of them.
///
/// A `Registry` is a cheap handle: clones share the same instruments. It is
/// usually collected by a single [Controller](crate::metrics::Controller), but
/// can also be collected directly with [Registry::collect].
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    scope: Cow<'static, str>,
    instruments: RwLock<Instruments>,
    callbacks: Mutex<Vec<Arc<Registration>>>,
    start: SystemTime,
    last_delta: Mutex<SystemTime>,
}

#[derive(Default)]
struct Instruments {
    by_name: HashMap<Cow<'static, str>, usize>,
    // creation order
    list: Vec<Instrument>,
}

impl Instruments {
    fn get(&self, name: &str) -> Option<&Instrument> {
        self.by_name.get(name).map(|&idx| &self.list[idx])
    }
}

struct Registration {
    instruments: Vec<Instrument>,
    callback: Callback,
}

/// Reports values from inside an observer callback.
///
/// An `Observer` only exists for the duration of a callback and only accepts
/// the instruments the callback was registered for.
pub struct Observer<'a> {
    allowed: &'a [Instrument],
}

impl Observer<'_> {
    /// Reports `value` for the series identified by `attributes`.
    ///
    /// For an [ObservableCounter] the value replaces the cumulative total of
    /// that series. Synchronous instruments record it like
    /// [Instrument::record] does.
    pub fn observe(
        &self,
        instrument: &Instrument,
        value: f64,
        attributes: &[KeyValue],
    ) -> MetricResult<()> {
        if !self.allowed.iter().any(|i| i.ptr_eq(instrument)) {
            return Err(MetricError::InvalidObservation(instrument.name().to_owned()));
        }
        instrument.measure(value, attributes)
    }
}

impl fmt::Debug for Observer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("instruments", &self.allowed)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new("default")
    }
}

impl Registry {
    /// Creates an empty registry. `scope` names the library or application the
    /// instruments belong to and is reported with every snapshot.
    pub fn new(scope: impl Into<Cow<'static, str>>) -> Self {
        let start = SystemTime::now();
        Registry {
            inner: Arc::new(RegistryInner {
                scope: scope.into(),
                instruments: RwLock::new(Instruments::default()),
                callbacks: Mutex::new(Vec::new()),
                start,
                last_delta: Mutex::new(start),
            }),
        }
    }

    /// The scope reported with every snapshot of this registry.
    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// Creates a builder for a [Counter].
    pub fn counter(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Counter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [UpDownCounter].
    pub fn up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Histogram].
    pub fn histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Histogram> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableCounter]. Values are reported from a
    /// callback registered with [Registry::register_observer].
    pub fn observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, ObservableCounter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Returns the instrument registered under `name`, creating it if needed.
    ///
    /// Fails with [MetricError::KindConflict] if `name` is already registered
    /// with another kind. When the kind matches but unit or description do
    /// not, a warning is logged and the existing instrument is returned
    /// unchanged.
    pub fn get_or_create(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: InstrumentKind,
        unit: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
    ) -> MetricResult<Instrument> {
        self.get_or_create_with_boundaries(
            name.into(),
            kind,
            unit.into(),
            description.into(),
            &DEFAULT_HISTOGRAM_BOUNDARIES,
        )
    }

    pub(crate) fn get_or_create_with_boundaries(
        &self,
        name: Cow<'static, str>,
        kind: InstrumentKind,
        unit: Cow<'static, str>,
        description: Cow<'static, str>,
        boundaries: &[f64],
    ) -> MetricResult<Instrument> {
        validate_instrument_name(&name)?;
        validate_instrument_unit(&unit)?;

        {
            let instruments = self.inner.instruments.read()?;
            if let Some(existing) = instruments.get(&name) {
                return reuse(existing, kind, &unit, &description);
            }
        }

        let mut instruments = self.inner.instruments.write()?;
        // Another thread may have registered the name between the two locks.
        if let Some(existing) = instruments.get(&name) {
            return reuse(existing, kind, &unit, &description);
        }

        let instrument = Instrument::new(name.clone(), kind, unit, description, boundaries);
        let idx = instruments.list.len();
        instruments.by_name.insert(name, idx);
        instruments.list.push(instrument.clone());
        otel_debug!(
            name: "Registry.InstrumentCreated",
            instrument_name = instrument.name(),
            kind = format!("{kind:?}"),
        );
        Ok(instrument)
    }

    /// Records `value` into `instrument`, see [Instrument::record].
    pub fn record(
        &self,
        instrument: &Instrument,
        value: f64,
        attributes: &[KeyValue],
    ) -> MetricResult<()> {
        instrument.record(value, attributes)
    }

    /// Registers a callback invoked once per collection, just before the
    /// snapshot is taken. The callback may only observe `instruments`.
    ///
    /// Every instrument must have been created by this registry.
    pub fn register_observer<F>(&self, instruments: &[Instrument], callback: F) -> MetricResult<()>
    where
        F: Fn(&Observer<'_>) + Send + Sync + 'static,
    {
        {
            let registered = self.inner.instruments.read()?;
            if let Some(foreign) = instruments.iter().find(|i| {
                registered
                    .get(i.name())
                    .map_or(true, |own| !own.ptr_eq(i))
            }) {
                return Err(MetricError::InvalidObservation(foreign.name().to_owned()));
            }
        }

        self.inner.callbacks.lock()?.push(Arc::new(Registration {
            instruments: instruments.to_vec(),
            callback: Box::new(callback),
        }));
        Ok(())
    }

    /// Captures every series with at least one data point.
    ///
    /// Under [Temporality::Delta] each series is reset together with its
    /// capture, so a concurrent measurement lands either in this snapshot or
    /// in the next one.
    pub fn snapshot(&self, temporality: Temporality) -> MetricResult<Snapshot> {
        let instruments = self.inner.instruments.read()?;
        let time = SystemTime::now();
        let start_time = match temporality {
            Temporality::Delta => mem::replace(&mut *self.inner.last_delta.lock()?, time),
            _ => self.inner.start,
        };

        let mut metrics = Vec::with_capacity(instruments.list.len());
        for instrument in &instruments.list {
            if let Some(data) = instrument.aggregation().call(temporality)? {
                metrics.push(Metric {
                    name: instrument.name_cow(),
                    description: instrument.description_cow(),
                    unit: instrument.unit_cow(),
                    kind: instrument.kind(),
                    data,
                });
            }
        }

        Ok(Snapshot {
            scope: self.inner.scope.clone(),
            temporality,
            start_time,
            time,
            metrics,
        })
    }

    /// Runs the observer callbacks one after the other, then takes a snapshot.
    pub fn collect(&self, temporality: Temporality) -> MetricResult<Snapshot> {
        let callbacks = self.inner.callbacks.lock()?.clone();
        for registration in callbacks {
            let observer = Observer {
                allowed: &registration.instruments,
            };
            (registration.callback)(&observer);
        }
        self.snapshot(temporality)
    }
}

fn reuse(
    existing: &Instrument,
    kind: InstrumentKind,
    unit: &str,
    description: &str,
) -> MetricResult<Instrument> {
    if existing.kind() != kind {
        return Err(MetricError::KindConflict {
            name: existing.name().to_owned(),
            existing: existing.kind(),
            requested: kind,
        });
    }
    if existing.unit() != unit || existing.description() != description {
        otel_warn!(
            name: "Registry.DuplicateInstrument",
            message = "Instrument already registered with a different unit or description, keeping the first registration.",
            instrument_name = existing.name(),
        );
    }
    Ok(existing.clone())
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Registry");
        debug.field("scope", &self.inner.scope);
        if let Ok(instruments) = self.inner.instruments.read() {
            debug.field("instruments", &instruments.list);
        }
        debug.finish()
    }
}
