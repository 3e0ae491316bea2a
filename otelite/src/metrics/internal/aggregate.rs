use std::sync::Arc;

use crate::metrics::data::MetricData;
use crate::metrics::{InstrumentKind, MetricResult, Temporality};
use crate::KeyValue;

use super::{histogram::Histogram, precomputed_sum::PrecomputedSum, sum::Sum};

/// Receives measurements to be aggregated.
pub(crate) trait Measure: Send + Sync + 'static {
    fn call(&self, measurement: f64, attrs: &[KeyValue]) -> MetricResult<()>;
}

/// Produces the aggregated data of every series, resetting it under delta
/// temporality. Returns `None` when no series has a data point to report.
pub(crate) trait ComputeAggregation: Send + Sync + 'static {
    fn call(&self, temporality: Temporality) -> MetricResult<Option<MetricData>>;
}

/// Separate `measure` and `collect` functions for an aggregate.
pub(crate) struct AggregateFns {
    pub(crate) measure: Arc<dyn Measure>,
    pub(crate) collect: Arc<dyn ComputeAggregation>,
}

impl<A> From<A> for AggregateFns
where
    A: Measure + ComputeAggregation,
{
    fn from(value: A) -> Self {
        let inst = Arc::new(value);
        Self {
            measure: inst.clone(),
            collect: inst,
        }
    }
}

impl AggregateFns {
    /// Builds the aggregate an instrument kind is summarised with.
    pub(crate) fn for_kind(kind: InstrumentKind, boundaries: &[f64]) -> Self {
        match kind {
            InstrumentKind::Counter => Sum::new(true).into(),
            InstrumentKind::UpDownCounter => Sum::new(false).into(),
            InstrumentKind::ObservableCounter => PrecomputedSum::new(true).into(),
            InstrumentKind::Histogram => Histogram::new(boundaries.to_vec()).into(),
        }
    }
}
