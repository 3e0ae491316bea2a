use std::{borrow::Cow, fmt, marker, sync::Arc};

use crate::KeyValue;

use super::internal::{AggregateFns, ComputeAggregation, Measure};
use super::{MetricError, MetricResult, Registry};

const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
pub(crate) const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
pub(crate) const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
pub(crate) const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
pub(crate) const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
pub(crate) const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
pub(crate) const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

/// Default explicit bucket boundaries of histograms.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// A group of instruments that record a distribution of values synchronously with
    /// the code path they are measuring.
    Histogram,
    /// A group of instruments that report monotonically increasing, pre-computed
    /// totals from a callback invoked once per collection.
    ObservableCounter,
}

impl InstrumentKind {
    /// `true` if values of this kind are reported through an observer callback.
    pub fn is_observable(&self) -> bool {
        matches!(self, InstrumentKind::ObservableCounter)
    }

    /// `true` if the reported sums never decrease.
    pub fn is_monotonic(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::ObservableCounter
        )
    }

    /// Checks `value` against the contract of this kind of instrument.
    fn validate(&self, name: &str, value: f64) -> MetricResult<()> {
        let valid = if self.is_monotonic() {
            value.is_finite() && value >= 0.0
        } else {
            value.is_finite()
        };
        if valid {
            Ok(())
        } else {
            Err(MetricError::InvalidValue {
                name: name.to_owned(),
                kind: *self,
                value,
            })
        }
    }
}

/// A named, typed handle through which measurements are recorded.
///
/// Instruments are created through a [`Registry`] and stay registered for its
/// whole lifetime. Cloning is cheap; all clones share the same series.
#[derive(Clone)]
pub struct Instrument {
    inner: Arc<InstrumentInner>,
}

struct InstrumentInner {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    kind: InstrumentKind,
    measure: Arc<dyn Measure>,
    collect: Arc<dyn ComputeAggregation>,
}

impl Instrument {
    pub(crate) fn new(
        name: Cow<'static, str>,
        kind: InstrumentKind,
        unit: Cow<'static, str>,
        description: Cow<'static, str>,
        boundaries: &[f64],
    ) -> Self {
        let AggregateFns { measure, collect } = AggregateFns::for_kind(kind, boundaries);
        Instrument {
            inner: Arc::new(InstrumentInner {
                name,
                description,
                unit,
                kind,
                measure,
                collect,
            }),
        }
    }

    /// The name of the instrument.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The kind of the instrument.
    pub fn kind(&self) -> InstrumentKind {
        self.inner.kind
    }

    /// The unit the instrument reports in.
    pub fn unit(&self) -> &str {
        &self.inner.unit
    }

    /// The description of the instrument.
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Records a measurement into the series identified by `attributes`.
    ///
    /// Counters only accept finite non-negative values, up-down counters and
    /// histograms any finite value. Observable counters can only be observed
    /// from a callback, see [`Registry::register_observer`].
    pub fn record(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        if self.inner.kind.is_observable() {
            return Err(MetricError::InvalidObservation(self.name().to_owned()));
        }
        self.measure(value, attributes)
    }

    /// Validates and aggregates without checking how the value was reported.
    pub(crate) fn measure(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.inner.kind.validate(self.name(), value)?;
        self.inner.measure.call(value, attributes)
    }

    pub(crate) fn aggregation(&self) -> &dyn ComputeAggregation {
        self.inner.collect.as_ref()
    }

    pub(crate) fn ptr_eq(&self, other: &Instrument) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn name_cow(&self) -> Cow<'static, str> {
        self.inner.name.clone()
    }

    pub(crate) fn unit_cow(&self) -> Cow<'static, str> {
        self.inner.unit.clone()
    }

    pub(crate) fn description_cow(&self) -> Cow<'static, str> {
        self.inner.description.clone()
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("unit", &self.inner.unit)
            .field("description", &self.inner.description)
            .finish()
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

pub(crate) fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

pub(crate) fn validate_instrument_unit(unit: &str) -> MetricResult<()> {
    if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_LENGTH,
        ));
    }
    if unit.contains(|c: char| !c.is_ascii()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_INVALID_CHAR,
        ));
    }
    Ok(())
}

/// An instrument handle of a fixed [InstrumentKind], built by an [InstrumentBuilder].
pub trait TypedInstrument: Sized {
    /// The kind every instrument of this type has.
    const KIND: InstrumentKind;

    /// Wraps an instrument already known to be of [`Self::KIND`].
    fn from_instrument(instrument: Instrument) -> Self;

    /// The underlying untyped instrument.
    fn as_instrument(&self) -> &Instrument;
}

macro_rules! typed_instrument {
    ($(#[$meta:meta])* $ty:ident, $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $ty(Instrument);

        impl TypedInstrument for $ty {
            const KIND: InstrumentKind = InstrumentKind::$kind;

            fn from_instrument(instrument: Instrument) -> Self {
                $ty(instrument)
            }

            fn as_instrument(&self) -> &Instrument {
                &self.0
            }
        }
    };
}

typed_instrument!(
    /// An instrument that records increasing values.
    Counter,
    Counter
);
typed_instrument!(
    /// An instrument that records increasing or decreasing values.
    UpDownCounter,
    UpDownCounter
);
typed_instrument!(
    /// An instrument that records a distribution of values.
    Histogram,
    Histogram
);
typed_instrument!(
    /// An instrument that reports monotonically increasing totals from a callback.
    ///
    /// Values are reported with [`Observer::observe`](crate::metrics::Observer::observe).
    ObservableCounter,
    ObservableCounter
);

impl Counter {
    /// Records an increment to the counter. Negative or non-finite values are
    /// rejected and leave the series untouched.
    pub fn add(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.record(value, attributes)
    }
}

impl UpDownCounter {
    /// Records an increment or decrement to the counter.
    pub fn add(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.record(value, attributes)
    }
}

impl Histogram {
    /// Adds an additional value to the distribution.
    pub fn record(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.record(value, attributes)
    }
}

/// Configuration for building an instrument.
pub struct InstrumentBuilder<'a, T> {
    registry: &'a Registry,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    boundaries: Option<Vec<f64>>,
    _marker: marker::PhantomData<T>,
}

impl<'a, T: TypedInstrument> InstrumentBuilder<'a, T> {
    pub(crate) fn new(registry: &'a Registry, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            registry,
            name,
            description: None,
            unit: None,
            boundaries: None,
            _marker: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Validates the configuration and registers the instrument, or returns the
    /// instrument already registered under the same name.
    pub fn build(self) -> MetricResult<T> {
        let boundaries = self
            .boundaries
            .unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDARIES.to_vec());
        self.registry
            .get_or_create_with_boundaries(
                self.name,
                T::KIND,
                self.unit.unwrap_or_default(),
                self.description.unwrap_or_default(),
                &boundaries,
            )
            .map(T::from_instrument)
    }
}

impl InstrumentBuilder<'_, Histogram> {
    /// Set the explicit bucket boundaries of the histogram.
    ///
    /// NaN boundaries are dropped; the rest are sorted and de-duplicated.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }
}

impl<T> fmt::Debug for InstrumentBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("boundaries", &self.boundaries)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}
