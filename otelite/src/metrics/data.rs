//! Types for delivery of pre-aggregated metric time series data.

use std::{borrow::Cow, time::SystemTime};

use crate::KeyValue;

use super::{attribute_set::AttributeSet, InstrumentKind, Temporality};

/// A consistent, point-in-time view of every series of a [Registry].
///
/// [Registry]: crate::metrics::Registry
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Name of the registry the metrics were collected from.
    pub scope: Cow<'static, str>,
    /// The temporality the values were aggregated with.
    pub temporality: Temporality,
    /// Start of the window the values cover: the registry creation time for
    /// cumulative snapshots, the previous collection for delta snapshots.
    pub start_time: SystemTime,
    /// The time the snapshot was taken.
    pub time: SystemTime,
    /// The collected metrics, in instrument registration order.
    pub metrics: Vec<Metric>,
}

impl Snapshot {
    /// `true` if no instrument produced a data point.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Returns the metric produced by the instrument called `name`.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Aggregated time series of a single instrument.
#[derive(Clone, Debug)]
pub struct Metric {
    /// The name of the instrument that created this data.
    pub name: Cow<'static, str>,
    /// The description of the instrument, which can be used in documentation.
    pub description: Cow<'static, str>,
    /// The unit in which the instrument reports.
    pub unit: Cow<'static, str>,
    /// The kind of the instrument.
    pub kind: InstrumentKind,
    /// The aggregated data from the instrument.
    pub data: MetricData,
}

impl Metric {
    /// The sum aggregation, for counters and up-down counters.
    pub fn sum(&self) -> Option<&Sum> {
        match &self.data {
            MetricData::Sum(sum) => Some(sum),
            MetricData::Histogram(_) => None,
        }
    }

    /// The histogram aggregation, for histograms.
    pub fn histogram(&self) -> Option<&Histogram> {
        match &self.data {
            MetricData::Histogram(histogram) => Some(histogram),
            MetricData::Sum(_) => None,
        }
    }
}

/// The aggregated data of an instrument.
#[derive(Clone, Debug)]
pub enum MetricData {
    /// Running sums, produced by counters, up-down counters and observable counters.
    Sum(Sum),
    /// Bucketed distributions, produced by histograms.
    Histogram(Histogram),
}

/// Represents the sum of all measurements of values from an instrument.
#[derive(Clone, Debug)]
pub struct Sum {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<SumDataPoint>,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
    /// Whether this aggregation only increases or decreases.
    pub is_monotonic: bool,
}

impl Sum {
    /// Returns the data point for the given attributes, in any order.
    pub fn data_point(&self, attributes: &[KeyValue]) -> Option<&SumDataPoint> {
        let wanted = AttributeSet::from(attributes);
        self.data_points
            .iter()
            .find(|dp| dp.attributes.as_slice() == wanted.as_slice())
    }
}

/// A single series of a [Sum].
#[derive(Clone, Debug, PartialEq)]
pub struct SumDataPoint {
    /// Attributes is the set of key value pairs that uniquely identify the
    /// time series, sorted by key.
    pub attributes: Vec<KeyValue>,
    /// The value of this data point.
    pub value: f64,
}

/// Represents the histogram of all measurements of values from an instrument.
#[derive(Clone, Debug)]
pub struct Histogram {
    /// Individual aggregated measurements with unique attributes.
    pub data_points: Vec<HistogramDataPoint>,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
}

impl Histogram {
    /// Returns the data point for the given attributes, in any order.
    pub fn data_point(&self, attributes: &[KeyValue]) -> Option<&HistogramDataPoint> {
        let wanted = AttributeSet::from(attributes);
        self.data_points
            .iter()
            .find(|dp| dp.attributes.as_slice() == wanted.as_slice())
    }
}

/// A single histogram data point in a time series.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDataPoint {
    /// The set of key value pairs that uniquely identify the time series,
    /// sorted by key.
    pub attributes: Vec<KeyValue>,
    /// The number of updates this histogram has been calculated with.
    pub count: u64,
    /// The upper bounds of the buckets of the histogram.
    ///
    /// Because the last boundary is +infinity this one is implied.
    pub bounds: Vec<f64>,
    /// The count of each of the buckets.
    pub bucket_counts: Vec<u64>,
    /// The minimum value recorded, `None` if nothing was recorded.
    pub min: Option<f64>,
    /// The maximum value recorded, `None` if nothing was recorded.
    pub max: Option<f64>,
    /// The sum of the values recorded.
    pub sum: f64,
}
