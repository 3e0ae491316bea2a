use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::KeyValue;

/// A normalised set of attributes identifying one series of an instrument.
///
/// Attributes are sorted by key and duplicate keys keep the value given last,
/// so `[a=1, b=2]` and `[b=2, a=1]` address the same series. The hash is
/// computed once since sets are looked up on every measurement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AttributeSet(Vec<KeyValue>, u64);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        let mut vec = values.to_vec();
        // stable sort keeps duplicates in call order, so the last one wins below
        vec.sort_by(|a, b| a.key.cmp(&b.key));

        let mut i = vec.len();
        while i > 1 {
            i -= 1;
            if vec[i - 1].key == vec[i].key {
                vec.remove(i - 1);
            }
        }

        let hash = calculate_hash(&vec);
        AttributeSet(vec, hash)
    }
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.iter().for_each(|kv| kv.hash(&mut hasher));
    hasher.finish()
}

impl AttributeSet {
    pub(crate) fn as_slice(&self) -> &[KeyValue] {
        &self.0
    }

    pub(crate) fn to_vec(&self) -> Vec<KeyValue> {
        self.0.clone()
    }
}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}
