use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use otelite::metrics::data::Snapshot;
use otelite::metrics::exporter::MetricExporter;
use otelite::metrics::{
    Controller, ControllerState, MetricError, MetricResult, Registry, Temporality,
    TypedInstrument,
};
use otelite::KeyValue;

/// Keeps exported snapshots and counts shutdowns.
#[derive(Clone, Default)]
struct RecordingExporter {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl RecordingExporter {
    fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricExporter for RecordingExporter {
    async fn export(&self, snapshot: &Snapshot) -> MetricResult<()> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Never finishes an export within any reasonable shutdown timeout.
#[derive(Clone, Default)]
struct SlowExporter {
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl MetricExporter for SlowExporter {
    async fn export(&self, _snapshot: &Snapshot) -> MetricResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counter_total(snapshots: &[Snapshot], name: &str) -> f64 {
    snapshots
        .iter()
        .filter_map(|s| s.metric(name).and_then(|m| m.sum()))
        .flat_map(|sum| sum.data_points.iter().map(|dp| dp.value))
        .sum()
}

#[test]
fn delta_exports_add_up_to_everything_recorded() {
    let registry = Registry::new("integration");
    let exporter = RecordingExporter::default();
    let controller = Controller::builder(registry.clone(), exporter.clone())
        .with_period(Duration::from_millis(10))
        .with_temporality(Temporality::Delta)
        .build();
    let counter = registry.counter("hits").build().unwrap();
    controller.start().unwrap();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for i in 0..2_500 {
                    counter.add(1.0, &[]).unwrap();
                    if i % 500 == 0 {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    controller.stop(Duration::from_secs(5)).unwrap();

    let snapshots = exporter.snapshots();
    assert!(snapshots.iter().all(|s| s.temporality == Temporality::Delta));
    assert_eq!(counter_total(&snapshots, "hits"), 10_000.0);
    assert_eq!(exporter.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn observable_counter_is_polled_every_cycle() {
    let registry = Registry::new("integration");
    let exporter = RecordingExporter::default();
    let controller = Controller::builder(registry.clone(), exporter.clone())
        .with_period(Duration::from_secs(60))
        .with_temporality(Temporality::Delta)
        .build();

    let observed = registry
        .observable_counter("some.prefix.counter_observer")
        .with_unit("1")
        .build()
        .unwrap();
    let instrument = observed.as_instrument().clone();
    let total = Arc::new(AtomicU64::new(0));
    let source = Arc::clone(&total);
    registry
        .register_observer(&[instrument.clone()], move |observer| {
            let value = source.fetch_add(10, Ordering::SeqCst) + 10;
            observer
                .observe(&instrument, value as f64, &[KeyValue::new("cpu", 0)])
                .unwrap();
        })
        .unwrap();

    controller.start().unwrap();
    controller.force_flush().unwrap();
    controller.force_flush().unwrap();
    controller.stop(Duration::from_secs(1)).unwrap();

    let deltas: Vec<f64> = exporter
        .snapshots()
        .iter()
        .map(|s| {
            s.metric("some.prefix.counter_observer")
                .and_then(|m| m.sum())
                .and_then(|sum| sum.data_point(&[KeyValue::new("cpu", 0)]))
                .map(|dp| dp.value)
                .unwrap()
        })
        .collect();
    assert_eq!(deltas, vec![10.0, 10.0, 10.0]);
    assert_eq!(total.load(Ordering::SeqCst), 30);
}

#[test]
fn stop_times_out_on_slow_exporter_and_exports_nothing_afterwards() {
    let registry = Registry::new("integration");
    let exporter = SlowExporter::default();
    let controller = Controller::builder(registry.clone(), exporter.clone())
        .with_period(Duration::from_millis(200))
        .build();
    registry
        .counter("requests")
        .build()
        .unwrap()
        .add(1.0, &[])
        .unwrap();
    controller.start().unwrap();

    let result = controller.stop(Duration::from_secs(1));
    assert!(matches!(result, Err(MetricError::ShutdownTimeout(_))));
    assert_eq!(controller.state(), ControllerState::Stopped);

    // a live ticker would have started two more exports by now
    thread::sleep(Duration::from_millis(500));
    assert_eq!(exporter.started.load(Ordering::SeqCst), 1);
    assert_eq!(exporter.completed.load(Ordering::SeqCst), 0);
    assert!(controller.stop(Duration::from_secs(1)).is_ok());
}

#[test]
fn stop_times_out_on_slow_exporter_with_nothing_recorded() {
    let exporter = SlowExporter::default();
    let controller = Controller::builder(Registry::new("integration"), exporter.clone()).build();
    controller.start().unwrap();

    let result = controller.stop(Duration::from_secs(1));
    assert!(matches!(result, Err(MetricError::ShutdownTimeout(_))));
    assert_eq!(exporter.started.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), ControllerState::Stopped);
}

#[test]
fn histogram_snapshots_through_the_controller() {
    let registry = Registry::new("integration");
    let exporter = RecordingExporter::default();
    let controller = Controller::builder(registry.clone(), exporter.clone())
        .with_period(Duration::from_secs(60))
        .with_temporality(Temporality::Delta)
        .build();
    let histogram = registry
        .histogram("latency")
        .with_unit("ms")
        .with_boundaries(vec![10.0, 50.0, 100.0])
        .build()
        .unwrap();
    controller.start().unwrap();

    histogram.record(24.0, &[]).unwrap();
    histogram.record(25.0, &[]).unwrap();
    controller.force_flush().unwrap();
    for _ in 0..3 {
        histogram.record(25.0, &[]).unwrap();
    }
    controller.stop(Duration::from_secs(1)).unwrap();

    let points: Vec<_> = exporter
        .snapshots()
        .iter()
        .filter_map(|s| s.metric("latency").and_then(|m| m.histogram()).cloned())
        .map(|h| h.data_points[0].clone())
        .collect();
    assert_eq!(points.len(), 2);
    assert_eq!((points[0].count, points[0].sum), (2, 49.0));
    assert_eq!(points[0].bucket_counts, vec![0, 2, 0, 0]);
    assert_eq!((points[1].count, points[1].sum), (3, 75.0));
    assert_eq!(points[1].bucket_counts, vec![0, 3, 0, 0]);
}

#[test]
fn invalid_measurements_never_reach_the_exporter() {
    let registry = Registry::new("integration");
    let exporter = RecordingExporter::default();
    let controller = Controller::builder(registry.clone(), exporter.clone()).build();
    let counter = registry.counter("requests").build().unwrap();
    let histogram = registry.histogram("latency").build().unwrap();
    controller.start().unwrap();

    assert!(counter.add(-1.0, &[]).is_err());
    assert!(counter.add(f64::NAN, &[]).is_err());
    assert!(histogram.record(f64::INFINITY, &[]).is_err());
    controller.stop(Duration::from_secs(1)).unwrap();

    let snapshots = exporter.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].is_empty());
}
