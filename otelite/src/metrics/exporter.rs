//! Interfaces for exporting metrics

use async_trait::async_trait;

use super::data::Snapshot;
use super::MetricResult;

/// Exporter handles the delivery of metric data to external receivers.
///
/// Exports run on the controller's worker, one at a time, and are bounded by
/// its export timeout. The future may be dropped before completion when the
/// timeout elapses or the controller is stopped.
#[async_trait]
pub trait MetricExporter: Send + Sync + 'static {
    /// Export serializes and transmits metric data to a receiver.
    ///
    /// All retry logic must be contained in this function. The controller does
    /// not retry; every error returned here is reported and then dropped.
    async fn export(&self, snapshot: &Snapshot) -> MetricResult<()>;

    /// Releases any held resources. Called once, after the final export of a
    /// stopping controller.
    ///
    /// After shutdown, calls to export should fail.
    fn shutdown(&self) -> MetricResult<()> {
        Ok(())
    }
}
