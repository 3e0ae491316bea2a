use std::sync::Mutex;

use crate::metrics::data::{self, MetricData, SumDataPoint};
use crate::metrics::{MetricResult, Temporality};
use crate::KeyValue;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

#[derive(Default)]
struct Observed {
    current: f64,
    reported: f64,
    observed: bool,
}

/// The cumulative value an observer reported for one series.
struct Observation {
    state: Mutex<Observed>,
}

impl Aggregator for Observation {
    type InitConfig = ();
    type PreComputedValue = f64;

    fn create(_init: &()) -> Self {
        Observation {
            state: Mutex::new(Observed::default()),
        }
    }

    fn update(&self, value: f64) {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        state.current = value;
        state.observed = true;
    }
}

impl Observation {
    /// Only series observed since the previous collection report a value.
    fn collect(&self, temporality: Temporality) -> Option<f64> {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        if !std::mem::replace(&mut state.observed, false) {
            return None;
        }
        match temporality {
            Temporality::Delta => {
                let delta = state.current - state.reported;
                state.reported = state.current;
                Some(delta)
            }
            Temporality::Cumulative => {
                state.reported = state.current;
                Some(state.current)
            }
        }
    }
}

/// Summarizes observations of pre-computed cumulative sums, such as the ones
/// reported by observable counters. The last observation of a cycle wins.
pub(crate) struct PrecomputedSum {
    value_map: ValueMap<Observation>,
    monotonic: bool,
}

impl PrecomputedSum {
    pub(crate) fn new(monotonic: bool) -> Self {
        PrecomputedSum {
            value_map: ValueMap::new(()),
            monotonic,
        }
    }
}

impl Measure for PrecomputedSum {
    fn call(&self, measurement: f64, attrs: &[KeyValue]) -> MetricResult<()> {
        self.value_map.measure(measurement, attrs)
    }
}

impl ComputeAggregation for PrecomputedSum {
    fn call(&self, temporality: Temporality) -> MetricResult<Option<MetricData>> {
        let data_points = self.value_map.collect(|attributes, tracker| {
            tracker.collect(temporality).map(|value| SumDataPoint {
                attributes: attributes.to_vec(),
                value,
            })
        })?;

        if data_points.is_empty() {
            return Ok(None);
        }

        Ok(Some(MetricData::Sum(data::Sum {
            data_points,
            temporality,
            is_monotonic: self.monotonic,
        })))
    }
}
