use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use otelite::metrics::data::Snapshot;
use otelite::metrics::exporter::MetricExporter as PushMetricExporter;
use otelite::metrics::{MetricError, MetricResult, MetricsConfig};
use otelite::{otel_debug, otel_warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;

use crate::transform::ExportMetricsServiceRequest;
use crate::METRICS_PATH;

const DEFAULT_ENDPOINT: &str = "localhost:4318";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SERVICE_NAME: &str = "unknown_service";

/// Errors that can occur while building an exporter.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ExporterBuildError {
    /// Invalid URI.
    #[error("invalid URI {0}. Reason {1}")]
    InvalidUri(String, String),

    /// Invalid configuration.
    #[error("{name}: {reason}")]
    InvalidConfig {
        /// The configuration name.
        name: String,
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// The HTTP client could not be created.
    #[error("failed to build http client: {0}")]
    ClientBuildFailed(String),
}

/// Builder for an OTLP/HTTP [MetricExporter].
#[derive(Debug)]
pub struct MetricExporterBuilder {
    endpoint: String,
    insecure: bool,
    timeout: Duration,
    headers: HashMap<String, String>,
    service_name: String,
}

impl Default for MetricExporterBuilder {
    fn default() -> Self {
        MetricExporterBuilder {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            insecure: false,
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
        }
    }
}

impl MetricExporterBuilder {
    /// Takes endpoint, transport security and timeout from `config`.
    pub fn from_config(self, config: &MetricsConfig) -> Self {
        self.with_endpoint(config.endpoint.clone())
            .with_insecure(config.insecure)
            .with_timeout(config.export_timeout)
    }

    /// Collector address, `host:port` or a full URL. `/v1/metrics` is appended
    /// unless already present.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use `http` instead of `https` for endpoints given without a scheme.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Timeout of a single request. A zero `timeout` is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Set additional headers to send to the collector.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Value of the `service.name` resource attribute.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Validates the configuration and creates the exporter.
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
        let endpoint = resolve_endpoint(&self.endpoint, self.insecure)?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
                ExporterBuildError::InvalidConfig {
                    name: "headers".into(),
                    reason: format!("invalid header name `{key}`: {err}"),
                }
            })?;
            let value =
                HeaderValue::from_str(value).map_err(|err| ExporterBuildError::InvalidConfig {
                    name: "headers".into(),
                    reason: format!("invalid value for header `{key}`: {err}"),
                })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ExporterBuildError::ClientBuildFailed(err.to_string()))?;

        otel_debug!(
            name: "MetricExporter.Built",
            endpoint = endpoint.as_str(),
            timeout_ms = self.timeout.as_millis() as u64,
        );
        Ok(MetricExporter {
            client,
            endpoint,
            service_name: self.service_name,
            is_shutdown: AtomicBool::new(false),
        })
    }
}

/// Resolves the full metrics URL. Endpoints without a scheme get `http` when
/// `insecure` is set and `https` otherwise.
fn resolve_endpoint(endpoint: &str, insecure: bool) -> Result<Url, ExporterBuildError> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(ExporterBuildError::InvalidUri(
            endpoint.to_owned(),
            "endpoint must not be empty".into(),
        ));
    }

    let base = if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        let scheme = if insecure { "http" } else { "https" };
        format!("{scheme}://{endpoint}")
    };
    let full = if base.ends_with(METRICS_PATH) {
        base
    } else {
        format!("{base}{METRICS_PATH}")
    };
    Url::parse(&full).map_err(|err| ExporterBuildError::InvalidUri(full, err.to_string()))
}

/// Exports metric snapshots to an OpenTelemetry collector as OTLP/HTTP JSON.
///
/// Every non-empty snapshot is a single `POST` to `<endpoint>/v1/metrics`;
/// empty snapshots are not sent. Transport errors and non-2xx responses fail
/// the export; there is no retry.
pub struct MetricExporter {
    client: reqwest::Client,
    endpoint: Url,
    service_name: String,
    is_shutdown: AtomicBool,
}

impl MetricExporter {
    /// Configuration options for the exporter.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }

    /// The URL snapshots are posted to.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl fmt::Debug for MetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricExporter")
            .field("endpoint", &self.endpoint.as_str())
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl PushMetricExporter for MetricExporter {
    async fn export(&self, snapshot: &Snapshot) -> MetricResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::ExportFailed("exporter is shut down".into()));
        }
        if snapshot.is_empty() {
            otel_debug!(name: "MetricExporter.NothingToExport");
            return Ok(());
        }

        let body = serde_json::to_vec(&ExportMetricsServiceRequest::new(
            &self.service_name,
            snapshot,
        ))
        .map_err(|err| MetricError::ExportFailed(format!("failed to encode snapshot: {err}")))?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| MetricError::ExportFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            otel_warn!(
                name: "MetricExporter.ExportRejected",
                status = status.as_u16(),
                reason = reason.as_str(),
            );
            return Err(MetricError::ExportFailed(format!(
                "collector responded with {status}: {reason}"
            )));
        }

        otel_debug!(
            name: "MetricExporter.ExportSucceeded",
            metrics = snapshot.metrics.len(),
        );
        Ok(())
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.is_shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }
}
