//! In-memory metric exporter for testing and debugging.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::data::Snapshot;
use super::exporter::MetricExporter;
use super::{MetricError, MetricResult};

/// A metrics exporter that keeps every exported [Snapshot] in memory.
///
/// Clones share the same storage, so a clone can be handed to a
/// [Controller](crate::metrics::Controller) while the original is used to
/// inspect what was exported.
///
/// # Example
///
/// ```
/// # use otelite::metrics::{InMemoryMetricExporter, Registry, Temporality};
/// # use otelite::metrics::exporter::MetricExporter;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let exporter = InMemoryMetricExporter::default();
/// let registry = Registry::new("example");
/// registry.counter("my_counter").build().unwrap().add(1.0, &[]).unwrap();
///
/// let snapshot = registry.collect(Temporality::Cumulative).unwrap();
/// exporter.export(&snapshot).await.unwrap();
///
/// for snapshot in exporter.get_finished_metrics().unwrap() {
///     println!("{:?}", snapshot);
/// }
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<VecDeque<Snapshot>>>,
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter").finish()
    }
}

impl InMemoryMetricExporter {
    /// Returns the snapshots exported so far, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [MetricError] if the internal lock cannot be acquired.
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<Snapshot>> {
        let metrics = self
            .metrics
            .lock()
            .map_err(|e| MetricError::Other(format!("Failed to lock metrics: {e}")))?;
        Ok(metrics.iter().cloned().collect())
    }

    /// Clears the internal storage of finished metrics.
    pub fn reset(&self) {
        let _ = self.metrics.lock().map(|mut metrics| metrics.clear());
    }
}

#[async_trait]
impl MetricExporter for InMemoryMetricExporter {
    async fn export(&self, snapshot: &Snapshot) -> MetricResult<()> {
        self.metrics
            .lock()
            .map(|mut metrics| metrics.push_back(snapshot.clone()))
            .map_err(|e| MetricError::Other(format!("Failed to lock metrics: {e}")))
    }
}
