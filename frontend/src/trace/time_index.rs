use shared::Timestamp;

/// Position at which `value` enters an already sorted slice.
///
/// Scans from the end backward and stops at the first element `value` is not
/// smaller than, so equal values land to the right of the existing ones and
/// in-order arrivals cost a single comparison.
pub fn sorted_insert_position<T: Ord>(sorted: &[T], value: &T) -> usize {
    sorted
        .iter()
        .rposition(|existing| value >= existing)
        .map_or(0, |index| index + 1)
}

/// Every timestamp seen so far, from both halves of every message.
///
/// Never re-sorted: each timestamp is placed by [`sorted_insert_position`], so
/// the sequence is non-decreasing after every insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIndex {
    times: Vec<Timestamp>,
}

impl TimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insertion_point(&self, time: Timestamp) -> usize {
        sorted_insert_position(&self.times, &time)
    }

    /// Inserts `time` and returns its position. Callers holding positions into
    /// this index must shift every position `>=` the returned one.
    pub(crate) fn insert(&mut self, time: Timestamp) -> usize {
        let position = self.insertion_point(time);
        self.times.insert(position, time);
        position
    }

    pub fn get(&self, position: usize) -> Option<Timestamp> {
        self.times.get(position).copied()
    }

    pub fn first(&self) -> Option<Timestamp> {
        self.times.first().copied()
    }

    pub fn last(&self) -> Option<Timestamp> {
        self.times.last().copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn as_slice(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn is_sorted(&self) -> bool {
        self.times.windows(2).all(|pair| pair[0] <= pair[1])
    }

    pub(crate) fn clear(&mut self) {
        self.times.clear();
    }
}
