mod aggregate;
mod histogram;
mod precomputed_sum;
mod sum;

use std::collections::HashMap;
use std::sync::RwLock;

pub(crate) use aggregate::{AggregateFns, ComputeAggregation, Measure};

use super::attribute_set::AttributeSet;
use super::MetricResult;
use crate::KeyValue;

/// Aggregation state of a single series.
///
/// Implementations guard their own state, so series of one instrument can be
/// updated concurrently while the series map is only read-locked.
pub(crate) trait Aggregator: Send + Sync + 'static {
    /// Shared configuration used to create new series, e.g. the bucket count.
    type InitConfig: Send + Sync + 'static;

    /// Value passed to [`Aggregator::update`], possibly derived from the raw
    /// measurement ahead of taking any lock.
    type PreComputedValue;

    fn create(init: &Self::InitConfig) -> Self;

    fn update(&self, value: Self::PreComputedValue);
}

/// The series of one instrument, keyed by normalised attribute set.
///
/// Series are never removed. A new series takes the write lock once; every
/// later measurement and every collection only takes the read lock plus the
/// series' own lock.
pub(crate) struct ValueMap<A: Aggregator> {
    trackers: RwLock<HashMap<AttributeSet, A>>,
    config: A::InitConfig,
}

impl<A: Aggregator> ValueMap<A> {
    pub(crate) fn new(config: A::InitConfig) -> Self {
        ValueMap {
            trackers: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub(crate) fn measure(
        &self,
        value: A::PreComputedValue,
        attributes: &[KeyValue],
    ) -> MetricResult<()> {
        let attributes = AttributeSet::from(attributes);
        {
            let trackers = self.trackers.read()?;
            if let Some(tracker) = trackers.get(&attributes) {
                tracker.update(value);
                return Ok(());
            }
        }

        // Another thread may have inserted the series between the two locks.
        let mut trackers = self.trackers.write()?;
        trackers
            .entry(attributes)
            .or_insert_with(|| A::create(&self.config))
            .update(value);
        Ok(())
    }

    /// Maps every series through `f` while holding the read lock, so no series
    /// is created half-way through a collection.
    pub(crate) fn collect<T>(
        &self,
        mut f: impl FnMut(&AttributeSet, &A) -> Option<T>,
    ) -> MetricResult<Vec<T>> {
        let trackers = self.trackers.read()?;
        Ok(trackers
            .iter()
            .filter_map(|(attributes, tracker)| f(attributes, tracker))
            .collect())
    }
}
