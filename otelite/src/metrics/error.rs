use std::result;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

use super::InstrumentKind;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics registry, controller and exporters.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// An instrument with the same name was already registered with a different kind.
    #[error("instrument `{name}` is already registered as {existing:?}, cannot register it as {requested:?}")]
    KindConflict {
        /// Name of the instrument.
        name: String,
        /// Kind the instrument was first registered with.
        existing: InstrumentKind,
        /// Kind of the rejected registration.
        requested: InstrumentKind,
    },
    /// The measurement is not valid for the instrument it was recorded on, e.g. a
    /// negative increment on a counter or a non-finite histogram value.
    #[error("invalid value {value} for {kind:?} `{name}`")]
    InvalidValue {
        /// Name of the instrument.
        name: String,
        /// Kind of the instrument.
        kind: InstrumentKind,
        /// The rejected value.
        value: f64,
    },
    /// An observation was made outside of a callback registered for the instrument.
    #[error("instrument `{0}` can only be observed from a callback registered for it")]
    InvalidObservation(String),
    /// The controller was started more than once.
    #[error("controller already started")]
    AlreadyStarted,
    /// The final collection during shutdown did not complete in time.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
    /// The exporter failed to deliver a snapshot.
    #[error("export failed: {0}")]
    ExportFailed(String),
    /// Invalid instrument configuration such as an invalid instrument name or unit.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),
    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
