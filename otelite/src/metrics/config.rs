use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::otel_warn;

use super::{MetricError, MetricResult, Temporality};

pub(crate) const DEFAULT_PERIOD: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ENDPOINT: &str = "localhost:4318";

/// Interval between the start of two collections, in milliseconds.
pub(crate) const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
/// Maximum time a single export may take, in milliseconds.
pub(crate) const OTEL_METRIC_EXPORT_TIMEOUT: &str = "OTEL_METRIC_EXPORT_TIMEOUT";
/// `cumulative` or `delta`, case-insensitive.
pub(crate) const OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE: &str =
    "OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE";
/// `host:port` or a full URL of the collector.
pub(crate) const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// `true` to send in plain text.
pub(crate) const OTEL_EXPORTER_OTLP_INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";

/// Settings shared by a [Controller](crate::metrics::Controller) and the
/// exporter it drives.
///
/// | field            | default          | environment variable                                 |
/// |------------------|------------------|------------------------------------------------------|
/// | `period`         | 3 s              | `OTEL_METRIC_EXPORT_INTERVAL` (ms)                   |
/// | `export_timeout` | 30 s             | `OTEL_METRIC_EXPORT_TIMEOUT` (ms)                    |
/// | `temporality`    | cumulative       | `OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE`  |
/// | `endpoint`       | `localhost:4318` | `OTEL_EXPORTER_OTLP_ENDPOINT`                        |
/// | `insecure`       | `false`          | `OTEL_EXPORTER_OTLP_INSECURE`                        |
///
/// Environment variables are only read by [MetricsConfig::from_env] and
/// [MetricsConfig::with_env].
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    /// Time between two collections.
    pub period: Duration,
    /// Temporality applied to every instrument.
    pub temporality: Temporality,
    /// Upper bound of a single export.
    pub export_timeout: Duration,
    /// Collector address, either `host:port` or a URL.
    pub endpoint: String,
    /// Send without TLS.
    pub insecure: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            period: DEFAULT_PERIOD,
            temporality: Temporality::default(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            insecure: false,
        }
    }
}

impl MetricsConfig {
    /// The default configuration, overridden by whichever environment
    /// variables are set.
    pub fn from_env() -> Self {
        MetricsConfig::default().with_env()
    }

    /// Overrides fields with the environment variables that are set. Values
    /// that fail to parse are logged and ignored.
    pub fn with_env(mut self) -> Self {
        if let Some(millis) = env_value::<u64>(OTEL_METRIC_EXPORT_INTERVAL) {
            self.period = Duration::from_millis(millis);
        }
        if let Some(millis) = env_value::<u64>(OTEL_METRIC_EXPORT_TIMEOUT) {
            self.export_timeout = Duration::from_millis(millis);
        }
        if let Some(temporality) =
            env_value::<Temporality>(OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE)
        {
            self.temporality = temporality;
        }
        if let Ok(endpoint) = env::var(OTEL_EXPORTER_OTLP_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_owned();
            }
        }
        if let Some(Flag(insecure)) = env_value::<Flag>(OTEL_EXPORTER_OTLP_INSECURE) {
            self.insecure = insecure;
        }
        self
    }

    /// Rejects a zero period or export timeout and an empty endpoint.
    pub fn validate(&self) -> MetricResult<()> {
        if self.period.is_zero() {
            return Err(MetricError::Config("period must be greater than zero".into()));
        }
        if self.export_timeout.is_zero() {
            return Err(MetricError::Config(
                "export timeout must be greater than zero".into(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(MetricError::Config("endpoint must not be empty".into()));
        }
        Ok(())
    }
}

struct Flag(bool);

impl FromStr for Flag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("true") {
            Ok(Flag(true))
        } else if s.eq_ignore_ascii_case("false") {
            Ok(Flag(false))
        } else {
            Err(())
        }
    }
}

fn env_value<T: FromStr>(name: &'static str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            otel_warn!(
                name: "Config.InvalidEnvValue",
                message = "Ignoring unparseable environment variable, keeping the default.",
                variable = name,
                value = raw.as_str(),
            );
            None
        }
    }
}
