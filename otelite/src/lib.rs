//! # otelite
//!
//! A small metrics collection and export core. Application code creates
//! instruments from a [`Registry`] and records measurements into them; a
//! [`Controller`] periodically collects the registry into a [`Snapshot`] and
//! hands it to a [`MetricExporter`].
//!
//! ```
//! use std::time::Duration;
//! use otelite::metrics::{Controller, InMemoryMetricExporter, Registry, Temporality};
//! use otelite::KeyValue;
//!
//! # fn main() -> Result<(), otelite::metrics::MetricError> {
//! let registry = Registry::new("app_or_package_name");
//! let exporter = InMemoryMetricExporter::default();
//! let controller = Controller::builder(registry.clone(), exporter.clone())
//!     .with_period(Duration::from_secs(3))
//!     .with_temporality(Temporality::Delta)
//!     .build();
//! controller.start()?;
//!
//! let counter = registry
//!     .counter("MyCounter_1")
//!     .with_unit("1")
//!     .with_description("This is a sample counter that increments by 1 every second.")
//!     .build()?;
//! counter.add(1.0, &[KeyValue::new("rate", "standard")])?;
//!
//! // stopping performs one last collection, so nothing recorded is lost.
//! controller.stop(Duration::from_secs(1))?;
//! assert_eq!(exporter.get_finished_metrics()?.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! [`Registry`]: metrics::Registry
//! [`Controller`]: metrics::Controller
//! [`Snapshot`]: metrics::data::Snapshot
//! [`MetricExporter`]: metrics::exporter::MetricExporter
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(test, deny(warnings))]

mod common;
mod internal_logging;
pub mod metrics;

pub use common::{Key, KeyValue, Value};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn}; // Re-export for the internal logging macros.
}
