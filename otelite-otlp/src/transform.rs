//! OTLP/JSON representation of a [Snapshot].
//!
//! Field names follow the proto3 JSON mapping: camelCase, 64-bit integers and
//! timestamps as decimal strings.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use otelite::metrics::data::{self, MetricData, Snapshot};
use otelite::metrics::Temporality;
use otelite::{KeyValue as OteliteKeyValue, Value};
use serde::Serialize;

const AGGREGATION_TEMPORALITY_DELTA: i32 = 1;
const AGGREGATION_TEMPORALITY_CUMULATIVE: i32 = 2;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportMetricsServiceRequest<'a> {
    resource_metrics: Vec<ResourceMetrics<'a>>,
}

impl<'a> ExportMetricsServiceRequest<'a> {
    pub(crate) fn new(service_name: &'a str, snapshot: &'a Snapshot) -> Self {
        let start = to_nanos(snapshot.start_time);
        let time = to_nanos(snapshot.time);
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Resource {
                    attributes: vec![KeyValue {
                        key: "service.name",
                        value: AnyValue::StringValue(Cow::Borrowed(service_name)),
                    }],
                },
                scope_metrics: vec![ScopeMetrics {
                    scope: InstrumentationScope {
                        name: &snapshot.scope,
                    },
                    metrics: snapshot
                        .metrics
                        .iter()
                        .map(|metric| Metric::new(metric, &start, &time))
                        .collect(),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetrics<'a> {
    resource: Resource<'a>,
    scope_metrics: Vec<ScopeMetrics<'a>>,
}

#[derive(Debug, Serialize)]
struct Resource<'a> {
    attributes: Vec<KeyValue<'a>>,
}

#[derive(Debug, Serialize)]
struct ScopeMetrics<'a> {
    scope: InstrumentationScope<'a>,
    metrics: Vec<Metric<'a>>,
}

#[derive(Debug, Serialize)]
struct InstrumentationScope<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Metric<'a> {
    name: &'a str,
    description: &'a str,
    unit: &'a str,
    #[serde(flatten)]
    data: Data<'a>,
}

impl<'a> Metric<'a> {
    fn new(metric: &'a data::Metric, start: &str, time: &str) -> Self {
        let data = match &metric.data {
            MetricData::Sum(sum) => Data::Sum(Sum {
                data_points: sum
                    .data_points
                    .iter()
                    .map(|dp| NumberDataPoint {
                        attributes: dp.attributes.iter().map(KeyValue::from).collect(),
                        start_time_unix_nano: start.to_owned(),
                        time_unix_nano: time.to_owned(),
                        as_double: dp.value,
                    })
                    .collect(),
                aggregation_temporality: aggregation_temporality(sum.temporality),
                is_monotonic: sum.is_monotonic,
            }),
            MetricData::Histogram(histogram) => Data::Histogram(Histogram {
                data_points: histogram
                    .data_points
                    .iter()
                    .map(|dp| HistogramDataPoint {
                        attributes: dp.attributes.iter().map(KeyValue::from).collect(),
                        start_time_unix_nano: start.to_owned(),
                        time_unix_nano: time.to_owned(),
                        count: dp.count.to_string(),
                        sum: dp.sum,
                        bucket_counts: dp.bucket_counts.iter().map(u64::to_string).collect(),
                        explicit_bounds: &dp.bounds,
                        min: dp.min,
                        max: dp.max,
                    })
                    .collect(),
                aggregation_temporality: aggregation_temporality(histogram.temporality),
            }),
        };
        Metric {
            name: &metric.name,
            description: &metric.description,
            unit: &metric.unit,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Data<'a> {
    Sum(Sum<'a>),
    Histogram(Histogram<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sum<'a> {
    data_points: Vec<NumberDataPoint<'a>>,
    aggregation_temporality: i32,
    is_monotonic: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NumberDataPoint<'a> {
    attributes: Vec<KeyValue<'a>>,
    start_time_unix_nano: String,
    time_unix_nano: String,
    as_double: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Histogram<'a> {
    data_points: Vec<HistogramDataPoint<'a>>,
    aggregation_temporality: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistogramDataPoint<'a> {
    attributes: Vec<KeyValue<'a>>,
    start_time_unix_nano: String,
    time_unix_nano: String,
    count: String,
    sum: f64,
    bucket_counts: Vec<String>,
    explicit_bounds: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
}

#[derive(Debug, Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: AnyValue<'a>,
}

impl<'a> From<&'a OteliteKeyValue> for KeyValue<'a> {
    fn from(kv: &'a OteliteKeyValue) -> Self {
        KeyValue {
            key: kv.key.as_str(),
            value: AnyValue::from(&kv.value),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum AnyValue<'a> {
    StringValue(Cow<'a, str>),
    BoolValue(bool),
    IntValue(String),
    DoubleValue(f64),
}

impl<'a> From<&'a Value> for AnyValue<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Bool(b) => AnyValue::BoolValue(*b),
            Value::I64(i) => AnyValue::IntValue(i.to_string()),
            Value::F64(f) => AnyValue::DoubleValue(*f),
            other => AnyValue::StringValue(other.as_str()),
        }
    }
}

fn aggregation_temporality(temporality: Temporality) -> i32 {
    match temporality {
        Temporality::Delta => AGGREGATION_TEMPORALITY_DELTA,
        _ => AGGREGATION_TEMPORALITY_CUMULATIVE,
    }
}

fn to_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use otelite::metrics::{Registry, Temporality};
    use otelite::KeyValue;
    use serde_json::{json, Value as Json};

    use super::*;

    fn encode(snapshot: &Snapshot) -> Json {
        serde_json::to_value(ExportMetricsServiceRequest::new("svc", snapshot)).unwrap()
    }

    #[test]
    fn sum_is_encoded_with_temporality_and_monotonicity() {
        let registry = Registry::new("scope-a");
        let counter = registry
            .counter("requests")
            .with_unit("1")
            .with_description("handled requests")
            .build()
            .unwrap();
        counter
            .add(
                3.0,
                &[
                    KeyValue::new("route", "/"),
                    KeyValue::new("code", 200),
                    KeyValue::new("cached", true),
                    KeyValue::new("ratio", 0.5),
                ],
            )
            .unwrap();

        let snapshot = registry.collect(Temporality::Delta).unwrap();
        let json = encode(&snapshot);

        let resource = &json["resourceMetrics"][0];
        assert_eq!(
            resource["resource"]["attributes"][0],
            json!({"key": "service.name", "value": {"stringValue": "svc"}})
        );
        let scope = &resource["scopeMetrics"][0];
        assert_eq!(scope["scope"]["name"], "scope-a");

        let metric = &scope["metrics"][0];
        assert_eq!(metric["name"], "requests");
        assert_eq!(metric["unit"], "1");
        assert_eq!(metric["description"], "handled requests");
        assert_eq!(metric["sum"]["aggregationTemporality"], 1);
        assert_eq!(metric["sum"]["isMonotonic"], true);

        let point = &metric["sum"]["dataPoints"][0];
        assert_eq!(point["asDouble"], 3.0);
        assert!(point["timeUnixNano"].is_string());
        // attributes are sorted by key
        assert_eq!(
            point["attributes"],
            json!([
                {"key": "cached", "value": {"boolValue": true}},
                {"key": "code", "value": {"intValue": "200"}},
                {"key": "ratio", "value": {"doubleValue": 0.5}},
                {"key": "route", "value": {"stringValue": "/"}},
            ])
        );
    }

    #[test]
    fn histogram_is_encoded_with_string_counts() {
        let registry = Registry::new("scope-b");
        let histogram = registry
            .histogram("latency")
            .with_boundaries(vec![10.0, 20.0])
            .build()
            .unwrap();
        histogram.record(5.0, &[]).unwrap();
        histogram.record(15.0, &[]).unwrap();

        let snapshot = registry.collect(Temporality::Cumulative).unwrap();
        let json = encode(&snapshot);
        let metric = &json["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0];
        assert_eq!(metric["histogram"]["aggregationTemporality"], 2);

        let point = &metric["histogram"]["dataPoints"][0];
        assert_eq!(point["count"], "2");
        assert_eq!(point["sum"], 20.0);
        assert_eq!(point["bucketCounts"], json!(["1", "1", "0"]));
        assert_eq!(point["explicitBounds"], json!([10.0, 20.0]));
        assert_eq!(point["min"], 5.0);
        assert_eq!(point["max"], 15.0);
        assert!(metric.get("sum").is_none());
    }

    #[test]
    fn timestamps_are_unix_nanos() {
        assert_eq!(to_nanos(UNIX_EPOCH + Duration::from_millis(1_500)), "1500000000");
        assert_eq!(to_nanos(UNIX_EPOCH), "0");
    }
}
