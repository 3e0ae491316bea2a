use std::mem::replace;
use std::sync::Mutex;

use crate::metrics::data::{self, HistogramDataPoint, MetricData};
use crate::metrics::{MetricResult, Temporality};
use crate::KeyValue;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

struct HistogramTracker {
    buckets: Mutex<Buckets>,
}

impl Aggregator for HistogramTracker {
    type InitConfig = usize;
    /// Value and bucket index
    type PreComputedValue = (f64, usize);

    fn create(count: &usize) -> Self {
        HistogramTracker {
            buckets: Mutex::new(Buckets::new(*count)),
        }
    }

    fn update(&self, (value, index): (f64, usize)) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        buckets.bin(index, value);
    }
}

impl HistogramTracker {
    /// Count, sum and buckets are read under one lock so they always agree.
    fn collect(&self, reset: bool) -> Option<Buckets> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        if buckets.count == 0 {
            return None;
        }
        if reset {
            let n = buckets.counts.len();
            Some(replace(&mut *buckets, Buckets::new(n)))
        } else {
            Some(buckets.clone())
        }
    }
}

#[derive(Clone)]
struct Buckets {
    counts: Vec<u64>,
    count: u64,
    total: f64,
    min: f64,
    max: f64,
}

impl Buckets {
    /// returns buckets with `n` bins.
    fn new(n: usize) -> Buckets {
        Buckets {
            counts: vec![0; n],
            count: 0,
            total: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    fn bin(&mut self, idx: usize, value: f64) {
        self.counts[idx] += 1;
        self.count += 1;
        self.total += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

/// Summarizes a set of measurements as a histogram with explicitly defined
/// buckets.
pub(crate) struct Histogram {
    value_map: ValueMap<HistogramTracker>,
    bounds: Vec<f64>,
}

impl Histogram {
    pub(crate) fn new(mut bounds: Vec<f64>) -> Self {
        bounds.retain(|v| !v.is_nan());
        bounds.sort_by(|a, b| a.partial_cmp(b).expect("NaNs filtered out"));
        bounds.dedup();

        Histogram {
            value_map: ValueMap::new(bounds.len() + 1),
            bounds,
        }
    }
}

impl Measure for Histogram {
    fn call(&self, measurement: f64, attrs: &[KeyValue]) -> MetricResult<()> {
        // This search will return an index in the range `[0, bounds.len()]`, where
        // it will return `bounds.len()` if value is greater than the last element
        // of `bounds`. This aligns with the buckets in that the length of buckets
        // is `bounds.len()+1`, with the last bucket representing:
        // `(bounds[bounds.len()-1], +∞)`.
        let index = self.bounds.partition_point(|&x| x < measurement);
        self.value_map.measure((measurement, index), attrs)
    }
}

impl ComputeAggregation for Histogram {
    fn call(&self, temporality: Temporality) -> MetricResult<Option<MetricData>> {
        let reset = temporality == Temporality::Delta;
        let data_points = self.value_map.collect(|attributes, tracker| {
            tracker.collect(reset).map(|b| HistogramDataPoint {
                attributes: attributes.to_vec(),
                count: b.count,
                bounds: self.bounds.clone(),
                bucket_counts: b.counts,
                min: Some(b.min),
                max: Some(b.max),
                sum: b.total,
            })
        })?;

        if data_points.is_empty() {
            return Ok(None);
        }

        Ok(Some(MetricData::Histogram(data::Histogram {
            data_points,
            temporality,
        })))
    }
}
