use std::{
    fmt, mem,
    sync::{mpsc as std_mpsc, Arc, Condvar, Mutex, PoisonError},
    thread,
    time::Duration,
};

use futures_util::future::{AbortHandle, Abortable};
use tokio::{
    runtime,
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{otel_debug, otel_error, otel_info, otel_warn};

use super::config::{DEFAULT_EXPORT_TIMEOUT, DEFAULT_PERIOD};
use super::exporter::MetricExporter;
use super::{MetricError, MetricResult, MetricsConfig, Registry, Temporality};

/// Timeout used when a running controller is stopped because it was dropped.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type ErrorHandler = Arc<dyn Fn(&MetricError) + Send + Sync + 'static>;

/// Configuration options for a [Controller].
///
/// By default the controller collects every 3 seconds, bounds each export to
/// 30 seconds and reports cumulative values.
pub struct ControllerBuilder {
    registry: Registry,
    exporter: Arc<dyn MetricExporter>,
    period: Duration,
    export_timeout: Duration,
    temporality: Temporality,
    error_handler: Option<ErrorHandler>,
}

impl ControllerBuilder {
    fn new(registry: Registry, exporter: Arc<dyn MetricExporter>) -> Self {
        ControllerBuilder {
            registry,
            exporter,
            period: DEFAULT_PERIOD,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            temporality: Temporality::default(),
            error_handler: None,
        }
    }

    /// Configures the time between the start of two collections.
    ///
    /// A zero `period` is ignored.
    pub fn with_period(mut self, period: Duration) -> Self {
        if !period.is_zero() {
            self.period = period;
        }
        self
    }

    /// Configures the time a single export may take before it is abandoned
    /// and reported as failed.
    ///
    /// A zero `timeout` is ignored.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.export_timeout = timeout;
        }
        self
    }

    /// Configures the [Temporality] applied to every instrument.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Configures a handler called with every error of a periodic collection
    /// or export. Errors are logged either way.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MetricError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Creates an idle [Controller].
    pub fn build(self) -> Controller {
        otel_debug!(
            name: "Controller.Building",
            period_ms = self.period.as_millis() as u64,
            export_timeout_ms = self.export_timeout.as_millis() as u64,
            temporality = format!("{}", self.temporality),
        );
        Controller {
            inner: Arc::new(ControllerInner {
                pipeline: Arc::new(Pipeline {
                    registry: self.registry,
                    exporter: self.exporter,
                    period: self.period,
                    export_timeout: self.export_timeout,
                    temporality: self.temporality,
                    error_handler: self.error_handler,
                }),
                lifecycle: Mutex::new(Lifecycle::Idle),
                stopped: Condvar::new(),
            }),
        }
    }
}

impl fmt::Debug for ControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBuilder")
            .field("registry", &self.registry.scope())
            .field("period", &self.period)
            .field("export_timeout", &self.export_timeout)
            .field("temporality", &self.temporality)
            .finish()
    }
}

/// The observable lifecycle of a [Controller].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// Built but not started.
    Idle,
    /// Collecting and exporting periodically.
    Running,
    /// A stop is in progress.
    Stopping,
    /// Stopped; the controller cannot be restarted.
    Stopped,
}

/// Periodically collects a [Registry] and exports the snapshots.
///
/// The controller owns a dedicated thread running a single-threaded Tokio
/// runtime. Every period it runs the registry's observer callbacks, takes a
/// snapshot and awaits the exporter, bounded by the export timeout. Exports
/// never overlap, and a failed export is reported but does not stop the
/// schedule.
///
/// Cloning is cheap and all clones control the same worker. Dropping the last
/// clone of a running controller stops it.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use otelite::metrics::{Controller, InMemoryMetricExporter, MetricsConfig, Registry};
///
/// # fn main() -> Result<(), otelite::metrics::MetricError> {
/// let registry = Registry::new("my_app");
/// let controller = Controller::with_config(
///     registry.clone(),
///     InMemoryMetricExporter::default(),
///     &MetricsConfig::from_env(),
/// )?;
/// controller.start()?;
/// // ...
/// controller.stop(Duration::from_secs(5))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    /// Configuration options for a controller collecting `registry` into
    /// `exporter`.
    pub fn builder<E>(registry: Registry, exporter: E) -> ControllerBuilder
    where
        E: MetricExporter,
    {
        ControllerBuilder::new(registry, Arc::new(exporter))
    }

    /// Creates an idle controller from a validated [MetricsConfig].
    pub fn with_config<E>(
        registry: Registry,
        exporter: E,
        config: &MetricsConfig,
    ) -> MetricResult<Self>
    where
        E: MetricExporter,
    {
        config.validate()?;
        Ok(Controller::builder(registry, exporter)
            .with_period(config.period)
            .with_export_timeout(config.export_timeout)
            .with_temporality(config.temporality)
            .build())
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ControllerState {
        match &*self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Lifecycle::Idle => ControllerState::Idle,
            Lifecycle::Running(_) => ControllerState::Running,
            Lifecycle::Stopping => ControllerState::Stopping,
            Lifecycle::Stopped => ControllerState::Stopped,
        }
    }

    /// Starts the worker. The first collection happens one period from now.
    ///
    /// # Errors
    ///
    /// [MetricError::AlreadyStarted] unless the controller is idle.
    pub fn start(&self) -> MetricResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock()?;
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(MetricError::AlreadyStarted);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (abort, registration) = AbortHandle::new_pair();
        let pipeline = Arc::clone(&self.inner.pipeline);
        let handle = thread::Builder::new()
            .name("otelite.metrics.controller".to_string())
            .spawn(move || {
                let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        otel_error!(
                            name: "Controller.RuntimeBuildFailed",
                            error = format!("{err}")
                        );
                        return;
                    }
                };
                if rt
                    .block_on(Abortable::new(pipeline.run(receiver), registration))
                    .is_err()
                {
                    otel_warn!(
                        name: "Controller.WorkerAborted",
                        message = "Final collection did not finish in time, in-flight export dropped."
                    );
                }
                otel_info!(name: "Controller.WorkerStopped");
            })
            .map_err(|err| {
                MetricError::Other(format!("failed to spawn controller worker: {err}"))
            })?;

        *lifecycle = Lifecycle::Running(Worker {
            sender,
            abort,
            handle,
        });
        otel_info!(
            name: "Controller.Started",
            period_ms = self.inner.pipeline.period.as_millis() as u64
        );
        Ok(())
    }

    /// Collects and exports immediately, waiting for the export to finish.
    /// The periodic schedule is not affected.
    ///
    /// # Errors
    ///
    /// Returns the collection or export error, or [MetricError::Other] if the
    /// controller is not running.
    pub fn force_flush(&self) -> MetricResult<()> {
        let (reply, response) = std_mpsc::channel();
        {
            let lifecycle = self.inner.lifecycle.lock()?;
            let Lifecycle::Running(worker) = &*lifecycle else {
                return Err(MetricError::Other("controller is not running".into()));
            };
            worker
                .sender
                .send(Message::Flush(reply))
                .map_err(|_| MetricError::Other("controller worker has exited".into()))?;
        }
        response
            .recv()
            .map_err(|_| MetricError::Other("controller worker exited before flushing".into()))?
    }

    /// Stops the controller after a final collection and export, then shuts
    /// the exporter down.
    ///
    /// The final pass gets `timeout` to finish. If it does not, the in-flight
    /// export is dropped and [MetricError::ShutdownTimeout] is returned. The
    /// worker thread has exited and the controller is [ControllerState::Stopped]
    /// when this returns, whatever the result.
    ///
    /// Observer callbacks run synchronously on the worker and cannot be
    /// interrupted. A callback that is still running at the deadline delays
    /// the return past `timeout` until it finishes.
    ///
    /// Stopping an idle controller skips the final pass. Stopping a stopped
    /// controller does nothing and returns `Ok`. A call made while another
    /// stop is in progress waits for that stop to finish and returns `Ok`.
    pub fn stop(&self, timeout: Duration) -> MetricResult<()> {
        let worker = {
            let mut lifecycle = self.inner.lifecycle.lock()?;
            let previous = mem::replace(&mut *lifecycle, Lifecycle::Stopping);
            match previous {
                Lifecycle::Running(worker) => Some(worker),
                Lifecycle::Idle => None,
                Lifecycle::Stopping => {
                    let _stopped = self
                        .inner
                        .stopped
                        .wait_while(lifecycle, |state| matches!(state, Lifecycle::Stopping))?;
                    return Ok(());
                }
                Lifecycle::Stopped => {
                    *lifecycle = Lifecycle::Stopped;
                    return Ok(());
                }
            }
        };

        let result = self.inner.finish(worker, timeout);
        *self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Lifecycle::Stopped;
        self.inner.stopped.notify_all();
        result
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.inner.pipeline.registry.scope())
            .field("period", &self.inner.pipeline.period)
            .field("temporality", &self.inner.pipeline.temporality)
            .field("state", &self.state())
            .finish()
    }
}

struct ControllerInner {
    pipeline: Arc<Pipeline>,
    lifecycle: Mutex<Lifecycle>,
    /// Signalled when a stop leaves [Lifecycle::Stopping].
    stopped: Condvar,
}

impl ControllerInner {
    /// Runs the final pass on `worker`, if any, then shuts the exporter down.
    fn finish(&self, worker: Option<Worker>, timeout: Duration) -> MetricResult<()> {
        let result = match worker {
            Some(worker) => worker.shutdown(timeout),
            None => Ok(()),
        };
        let exporter_result = self.pipeline.exporter.shutdown();
        result.and(exporter_result)
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let lifecycle = mem::replace(
            self.lifecycle
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Stopped,
        );
        if let Lifecycle::Running(worker) = lifecycle {
            otel_debug!(
                name: "Controller.Drop",
                message = "Last controller handle dropped while running, stopping it."
            );
            if let Err(err) = self.finish(Some(worker), DEFAULT_SHUTDOWN_TIMEOUT) {
                otel_error!(
                    name: "Controller.Drop.StopFailed",
                    error = format!("{err}")
                );
            }
        }
    }
}

enum Lifecycle {
    Idle,
    Running(Worker),
    Stopping,
    Stopped,
}

struct Worker {
    sender: mpsc::UnboundedSender<Message>,
    abort: AbortHandle,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    /// Asks for a final pass, aborts the worker if it misses `timeout`, and
    /// joins the thread.
    fn shutdown(self, timeout: Duration) -> MetricResult<()> {
        let (reply, response) = std_mpsc::channel();
        let result = if self
            .sender
            .send(Message::Shutdown { timeout, reply })
            .is_err()
        {
            Err(MetricError::Other("controller worker has exited".into()))
        } else {
            match response.recv_timeout(timeout) {
                Ok(result) => result,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    self.abort.abort();
                    Err(MetricError::ShutdownTimeout(timeout))
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(MetricError::Other(
                    "controller worker exited before shutting down".into(),
                )),
            }
        };

        // A callback that never returns blocks here; it cannot be preempted.
        if self.handle.join().is_err() {
            otel_error!(name: "Controller.WorkerPanicked");
        }
        result
    }
}

enum Message {
    Flush(std_mpsc::Sender<MetricResult<()>>),
    Shutdown {
        timeout: Duration,
        reply: std_mpsc::Sender<MetricResult<()>>,
    },
}

/// Everything the worker needs; holds no reference back to the controller.
struct Pipeline {
    registry: Registry,
    exporter: Arc<dyn MetricExporter>,
    period: Duration,
    export_timeout: Duration,
    temporality: Temporality,
    error_handler: Option<ErrorHandler>,
}

impl Pipeline {
    async fn run(self: Arc<Self>, mut messages: mpsc::UnboundedReceiver<Message>) {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                message = messages.recv() => match message {
                    Some(Message::Flush(reply)) => {
                        otel_debug!(name: "Controller.ExportingDueToFlush");
                        let _ = reply.send(self.collect_and_export().await);
                    }
                    Some(Message::Shutdown { timeout, reply }) => {
                        otel_debug!(name: "Controller.ExportingDueToShutdown");
                        let result = time::timeout(timeout, self.collect_and_export())
                            .await
                            .unwrap_or(Err(MetricError::ShutdownTimeout(timeout)));
                        let _ = reply.send(result);
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    otel_debug!(name: "Controller.ExportingDueToTimer");
                    if let Err(err) = self.collect_and_export().await {
                        self.report(&err);
                    }
                }
            }
        }
    }

    async fn collect_and_export(&self) -> MetricResult<()> {
        let snapshot = self.registry.collect(self.temporality)?;
        otel_debug!(
            name: "Controller.Collected",
            metrics = snapshot.metrics.len()
        );

        match time::timeout(self.export_timeout, self.exporter.export(&snapshot)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err @ MetricError::ExportFailed(_))) => Err(err),
            Ok(Err(err)) => Err(MetricError::ExportFailed(err.to_string())),
            Err(_) => Err(MetricError::ExportFailed(format!(
                "export timed out after {:?}",
                self.export_timeout
            ))),
        }
    }

    fn report(&self, err: &MetricError) {
        otel_error!(
            name: "Controller.ExportFailed",
            error = format!("{err}")
        );
        if let Some(handler) = &self.error_handler {
            handler(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant as StdInstant;

    use async_trait::async_trait;

    use super::*;
    use crate::metrics::data::Snapshot;
    use crate::metrics::InMemoryMetricExporter;
    use crate::KeyValue;

    #[derive(Clone, Default)]
    struct SlowExporter {
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricExporter for SlowExporter {
        async fn export(&self, _snapshot: &Snapshot) -> MetricResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_secs(5)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) -> MetricResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FailingExporter {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricExporter for FailingExporter {
        async fn export(&self, _snapshot: &Snapshot) -> MetricResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(MetricError::ExportFailed("connection refused".into()))
        }
    }

    #[derive(Clone, Default)]
    struct CountingExporter {
        started: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricExporter for CountingExporter {
        async fn export(&self, _snapshot: &Snapshot) -> MetricResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sum_values(exporter: &InMemoryMetricExporter, name: &str) -> Vec<f64> {
        exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .filter_map(|s| s.metric(name).and_then(|m| m.sum()))
            .map(|sum| sum.data_points[0].value)
            .collect()
    }

    #[test]
    fn start_twice_fails() {
        let controller =
            Controller::builder(Registry::default(), InMemoryMetricExporter::default()).build();
        assert_eq!(controller.state(), ControllerState::Idle);
        controller.start().unwrap();
        assert_eq!(controller.state(), ControllerState::Running);
        assert!(matches!(controller.start(), Err(MetricError::AlreadyStarted)));
        controller.stop(Duration::from_secs(1)).unwrap();
        assert!(matches!(controller.start(), Err(MetricError::AlreadyStarted)));
    }

    #[test]
    fn stop_is_idempotent() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone()).build();
        controller.start().unwrap();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();

        assert!(controller.stop(Duration::from_secs(1)).is_ok());
        assert!(controller.stop(Duration::from_secs(1)).is_ok());
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    }

    #[test]
    fn stop_on_idle_does_not_export() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone()).build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();

        controller.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(exporter.get_finished_metrics().unwrap().is_empty());
    }

    #[test]
    fn exports_periodically() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_millis(50))
            .build();
        let counter = registry.counter("ticks").build().unwrap();
        counter.add(1.0, &[]).unwrap();
        controller.start().unwrap();

        thread::sleep(Duration::from_millis(400));
        let exported = sum_values(&exporter, "ticks");
        assert!(exported.len() >= 2, "got {} exports", exported.len());
        assert!(exported.iter().all(|v| *v == 1.0));
        controller.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn first_export_waits_one_period() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();
        controller.start().unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(exporter.get_finished_metrics().unwrap().is_empty());
        controller.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn delta_flushes_report_changes() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .with_temporality(Temporality::Delta)
            .build();
        let counter = registry.counter("requests").build().unwrap();
        let attrs = [KeyValue::new("key1", "value1")];
        controller.start().unwrap();

        counter.add(5.0, &attrs).unwrap();
        counter.add(3.0, &attrs).unwrap();
        controller.force_flush().unwrap();
        counter.add(2.0, &attrs).unwrap();
        controller.force_flush().unwrap();
        // nothing new, nothing exported
        controller.force_flush().unwrap();
        controller.stop(Duration::from_secs(1)).unwrap();

        assert_eq!(sum_values(&exporter, "requests"), vec![8.0, 2.0]);
    }

    #[test]
    fn cumulative_flushes_report_totals() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        let counter = registry.counter("requests").build().unwrap();
        controller.start().unwrap();

        counter.add(8.0, &[]).unwrap();
        controller.force_flush().unwrap();
        counter.add(2.0, &[]).unwrap();
        controller.stop(Duration::from_secs(1)).unwrap();

        assert_eq!(sum_values(&exporter, "requests"), vec![8.0, 10.0]);
    }

    #[test]
    fn force_flush_requires_running_controller() {
        let controller =
            Controller::builder(Registry::default(), InMemoryMetricExporter::default()).build();
        assert!(matches!(controller.force_flush(), Err(MetricError::Other(_))));
    }

    #[test]
    fn slow_export_times_out_on_stop() {
        let registry = Registry::default();
        let exporter = SlowExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();
        controller.start().unwrap();

        let begin = StdInstant::now();
        let result = controller.stop(Duration::from_secs(1));
        assert!(matches!(result, Err(MetricError::ShutdownTimeout(_))));
        assert!(begin.elapsed() < Duration::from_secs(4));
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(exporter.shutdowns.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(200));
        assert_eq!(exporter.started.load(Ordering::SeqCst), 1);
        assert_eq!(exporter.finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn export_timeout_fails_the_export() {
        let registry = Registry::default();
        let controller = Controller::builder(registry.clone(), SlowExporter::default())
            .with_period(Duration::from_secs(60))
            .with_export_timeout(Duration::from_millis(50))
            .build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();
        controller.start().unwrap();

        assert!(matches!(
            controller.force_flush(),
            Err(MetricError::ExportFailed(_))
        ));
        let _ = controller.stop(Duration::from_secs(1));
    }

    #[test]
    fn export_failures_go_to_the_error_handler() {
        let registry = Registry::default();
        let exporter = FailingExporter::default();
        let handled = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&handled);
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_millis(30))
            .with_error_handler(move |err| {
                assert!(matches!(err, MetricError::ExportFailed(_)));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();
        controller.start().unwrap();

        thread::sleep(Duration::from_millis(300));
        assert!(handled.load(Ordering::SeqCst) >= 2);
        assert_eq!(controller.state(), ControllerState::Running);
        assert!(matches!(
            controller.stop(Duration::from_secs(1)),
            Err(MetricError::ExportFailed(_))
        ));
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[test]
    fn dropping_a_running_controller_stops_it() {
        let registry = Registry::default();
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(registry.clone(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        registry.counter("c").build().unwrap().add(1.0, &[]).unwrap();
        controller.start().unwrap();
        let clone = controller.clone();

        drop(controller);
        assert_eq!(clone.state(), ControllerState::Running);
        drop(clone);
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    }

    #[test]
    fn controllers_are_independent() {
        let (first, second) = (Registry::new("first"), Registry::new("second"));
        let (first_out, second_out) = (
            InMemoryMetricExporter::default(),
            InMemoryMetricExporter::default(),
        );
        let a = Controller::builder(first.clone(), first_out.clone()).build();
        let b = Controller::builder(second.clone(), second_out.clone()).build();
        a.start().unwrap();
        b.start().unwrap();
        first.counter("c").build().unwrap().add(1.0, &[]).unwrap();

        a.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(b.state(), ControllerState::Running);
        b.stop(Duration::from_secs(1)).unwrap();

        assert_eq!(first_out.get_finished_metrics().unwrap()[0].scope, "first");
        let second_snapshots = second_out.get_finished_metrics().unwrap();
        assert_eq!(second_snapshots.len(), 1);
        assert!(second_snapshots[0].is_empty());
    }

    #[test]
    fn empty_snapshots_are_exported() {
        let exporter = InMemoryMetricExporter::default();
        let controller = Controller::builder(Registry::new("quiet"), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        controller.start().unwrap();

        controller.force_flush().unwrap();
        controller.stop(Duration::from_secs(1)).unwrap();

        let snapshots = exporter.get_finished_metrics().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.is_empty() && s.scope == "quiet"));
    }

    #[test]
    fn slow_export_times_out_on_stop_without_measurements() {
        let exporter = SlowExporter::default();
        let controller = Controller::builder(Registry::default(), exporter.clone()).build();
        controller.start().unwrap();

        let result = controller.stop(Duration::from_secs(1));
        assert!(matches!(result, Err(MetricError::ShutdownTimeout(_))));
        assert_eq!(exporter.started.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[test]
    fn concurrent_stop_waits_for_the_first_one() {
        let exporter = SlowExporter::default();
        let controller = Controller::builder(Registry::default(), exporter.clone())
            .with_period(Duration::from_secs(60))
            .build();
        controller.start().unwrap();

        let first = {
            let controller = controller.clone();
            thread::spawn(move || controller.stop(Duration::from_secs(1)))
        };
        thread::sleep(Duration::from_millis(200));
        assert_eq!(controller.state(), ControllerState::Stopping);

        assert!(controller.stop(Duration::from_secs(1)).is_ok());
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(exporter.shutdowns.load(Ordering::SeqCst), 1);
        assert!(matches!(
            first.join().unwrap(),
            Err(MetricError::ShutdownTimeout(_))
        ));
    }

    #[test]
    fn no_export_starts_after_stop() {
        let exporter = CountingExporter::default();
        let controller = Controller::builder(Registry::default(), exporter.clone())
            .with_period(Duration::from_millis(20))
            .build();
        controller.start().unwrap();

        thread::sleep(Duration::from_millis(150));
        assert!(exporter.started.load(Ordering::SeqCst) >= 2);
        controller.stop(Duration::from_secs(1)).unwrap();

        let after_stop = exporter.started.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(exporter.started.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn with_config_validates() {
        let config = MetricsConfig {
            period: Duration::ZERO,
            ..Default::default()
        };
        let result = Controller::with_config(
            Registry::default(),
            InMemoryMetricExporter::default(),
            &config,
        );
        assert!(matches!(result, Err(MetricError::Config(_))));
    }
}
