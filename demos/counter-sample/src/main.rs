use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use otelite::metrics::{
    Controller, Counter, Histogram, MetricError, MetricsConfig, Registry, Temporality,
    TypedInstrument, UpDownCounter,
};
use otelite::KeyValue;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    // otelite's own events at debug, everything else at info, unless RUST_LOG is set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,otelite=debug,otelite_otlp=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .init();
}

fn init_controller(
    registry: &Registry,
) -> Result<Controller, Box<dyn Error + Send + Sync + 'static>> {
    let mut config = MetricsConfig::from_env();
    config.insecure = true;
    config.temporality = Temporality::Delta;

    let exporter = otelite_otlp::MetricExporter::builder()
        .from_config(&config)
        .with_service_name("counter-sample")
        .build()?;
    println!(
        "reporting measurements to {}... (press Ctrl+C to stop)",
        exporter.endpoint()
    );

    let controller = Controller::with_config(registry.clone(), exporter, &config)?;
    controller.start()?;
    Ok(controller)
}

async fn record_every_second(
    counter: Counter,
    in_flight: UpDownCounter,
    latency: Histogram,
) -> Result<(), MetricError> {
    let attributes = [KeyValue::new("rate", "standard")];
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let started = Instant::now();
        in_flight.add(1.0, &attributes)?;
        counter.add(1.0, &attributes)?;
        in_flight.add(-1.0, &attributes)?;
        latency.record(started.elapsed().as_secs_f64() * 1e6, &attributes)?;
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut terminate), Ok(mut quit)) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                    _ = quit.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    init_tracing();

    let registry = Registry::new("app_or_package_name");
    let controller = init_controller(&registry)?;

    let counter = registry
        .counter("MyCounter_1")
        .with_unit("1")
        .with_description("This is a sample counter that increments by 1 every second.")
        .build()?;
    let in_flight = registry
        .up_down_counter("MyUpDownCounter_1")
        .with_unit("1")
        .with_description("Work items currently being processed.")
        .build()?;
    let latency = registry
        .histogram("MyHistogram_1")
        .with_unit("us")
        .with_description("Time spent on one iteration of the sample loop.")
        .build()?;

    let observed = registry
        .observable_counter("some.prefix.counter_observer")
        .with_unit("1")
        .with_description("Number of collections observed so far.")
        .build()?;
    let instrument = observed.as_instrument().clone();
    let collections = Arc::new(AtomicU64::new(0));
    let number = Arc::clone(&collections);
    registry.register_observer(&[instrument.clone()], move |observer| {
        let value = number.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(err) = observer.observe(&instrument, value as f64, &[]) {
            warn!(error = %err, "observation rejected");
        }
    })?;

    let recorder = tokio::spawn(record_every_second(counter, in_flight, latency));

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown requested"),
        result = recorder => {
            if let Ok(Err(err)) = result {
                error!(error = %err, "recording failed");
            }
        }
    }

    // stop joins the controller thread, keep it off the async workers.
    let stopped =
        tokio::task::spawn_blocking(move || controller.stop(Duration::from_secs(5))).await?;
    if let Err(err) = stopped {
        error!(error = %err, "controller did not stop cleanly");
    }
    info!(
        collections = collections.load(Ordering::Relaxed),
        "controller stopped"
    );
    Ok(())
}
