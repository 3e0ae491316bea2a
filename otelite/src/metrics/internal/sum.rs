use std::sync::Mutex;

use crate::metrics::data::{self, MetricData, SumDataPoint};
use crate::metrics::{MetricResult, Temporality};
use crate::KeyValue;

use super::{Aggregator, ComputeAggregation, Measure, ValueMap};

#[derive(Default)]
struct Running {
    value: f64,
    has_value: bool,
}

struct Increment {
    state: Mutex<Running>,
}

impl Aggregator for Increment {
    type InitConfig = ();
    type PreComputedValue = f64;

    fn create(_init: &()) -> Self {
        Increment {
            state: Mutex::new(Running::default()),
        }
    }

    fn update(&self, value: f64) {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        state.value += value;
        state.has_value = true;
    }
}

impl Increment {
    /// Reads the sum, and under `reset` zeroes it in the same critical section.
    fn collect(&self, reset: bool) -> Option<f64> {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        if !state.has_value {
            return None;
        }
        if reset {
            Some(std::mem::take(&mut *state).value)
        } else {
            Some(state.value)
        }
    }
}

/// Summarizes a set of measurements made as their arithmetic sum.
pub(crate) struct Sum {
    value_map: ValueMap<Increment>,
    monotonic: bool,
}

impl Sum {
    /// Each sum is scoped by attributes and, under delta temporality, by the
    /// collection cycle the measurements were made in.
    pub(crate) fn new(monotonic: bool) -> Self {
        Sum {
            value_map: ValueMap::new(()),
            monotonic,
        }
    }
}

impl Measure for Sum {
    fn call(&self, measurement: f64, attrs: &[KeyValue]) -> MetricResult<()> {
        self.value_map.measure(measurement, attrs)
    }
}

impl ComputeAggregation for Sum {
    fn call(&self, temporality: Temporality) -> MetricResult<Option<MetricData>> {
        let reset = temporality == Temporality::Delta;
        let data_points = self.value_map.collect(|attributes, tracker| {
            tracker.collect(reset).map(|value| SumDataPoint {
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
