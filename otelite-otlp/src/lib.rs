//! # otelite-otlp
//!
//! Sends [otelite] metric snapshots to an OpenTelemetry collector using
//! OTLP over HTTP with the JSON encoding.
//!
//! ```no_run
//! use std::time::Duration;
//! use otelite::metrics::{Controller, MetricsConfig, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
//! let config = MetricsConfig::from_env();
//! let exporter = otelite_otlp::MetricExporter::builder()
//!     .from_config(&config)
//!     .with_service_name("my-service")
//!     .build()?;
//!
//! let registry = Registry::new("my_app");
//! let controller = Controller::with_config(registry.clone(), exporter, &config)?;
//! controller.start()?;
//! registry.counter("requests").build()?.add(1.0, &[])?;
//! controller.stop(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(test, deny(warnings))]

mod exporter;
mod transform;

pub use exporter::{ExporterBuildError, MetricExporter, MetricExporterBuilder};

/// Path the collector accepts metrics on.
pub const METRICS_PATH: &str = "/v1/metrics";
