//! Instrument registry, collection controller and temporality policy.
//!
//! ## Recording
//!
//! Instruments are created from a [Registry] and live as long as it does.
//! Measurements are aggregated per instrument and attribute set; the order of
//! the attributes does not matter.
//!
//! ## Exporting
//!
//! A [Controller] owns a background worker that periodically runs the observer
//! callbacks registered on its registry, takes a [Snapshot](data::Snapshot) and
//! hands it to a [MetricExporter](exporter::MetricExporter). The
//! [Temporality] chosen at construction decides whether snapshots report
//! totals since the registry was created or changes since the previous
//! collection.
//!
//! ### Example
//!
//! ```
//! use otelite::metrics::{Registry, Temporality};
//! use otelite::KeyValue;
//!
//! # fn main() -> Result<(), otelite::metrics::MetricError> {
//! let registry = Registry::new("my_app");
//! let counter = registry.counter("power_consumption").with_unit("kWh").build()?;
//! counter.add(10.0, &[KeyValue::new("rate", "standard")])?;
//!
//! let snapshot = registry.collect(Temporality::Cumulative)?;
//! let sum = snapshot.metric("power_consumption").and_then(|m| m.sum()).unwrap();
//! assert_eq!(sum.data_points[0].value, 10.0);
//! # Ok(())
//! # }
//! ```

mod attribute_set;
mod config;
mod controller;
pub mod data;
mod error;
pub mod exporter;
pub mod in_memory_exporter;
mod instrument;
pub(crate) mod internal;
mod registry;

use std::fmt;
use std::str::FromStr;

pub use config::MetricsConfig;
pub use controller::{Controller, ControllerBuilder, ControllerState};
pub use error::{MetricError, MetricResult};
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    Counter, Histogram, Instrument, InstrumentBuilder, InstrumentKind, ObservableCounter,
    TypedInstrument, UpDownCounter, DEFAULT_HISTOGRAM_BOUNDARIES,
};
pub use registry::{Observer, Registry};

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Temporality::Cumulative => "cumulative",
            Temporality::Delta => "delta",
        })
    }
}

impl FromStr for Temporality {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cumulative") {
            Ok(Temporality::Cumulative)
        } else if s.eq_ignore_ascii_case("delta") {
            Ok(Temporality::Delta)
        } else {
            Err(MetricError::Config(format!("unknown temporality `{s}`")))
        }
    }
}
