use parking_lot::Mutex;

/// Returned by [`OrderedSequence::add`] when called with no items.
pub const ADD_FAILED: i64 = -1;

/// A thread-safe, append-only ordered sequence.
///
/// Once an element has been appended its index is stable for the lifetime of
/// the sequence: there is no removal operation, so a caller that has read
/// `snapshot()[i]` can always re-read index `i` later and get the same slot
/// (possibly overwritten via [`OrderedSequence::set`], never vacated).
pub struct OrderedSequence<T> {
    data: Mutex<Vec<T>>,
}

impl<T> Default for OrderedSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedSequence<T> {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }

    pub fn from_iter(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            data: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Current length.
    pub fn count(&self) -> usize {
        self.data.lock().len()
    }

    /// Sets the value at `position`, iff `position` is in range. Silent no-op
    /// otherwise.
    pub fn set(&self, position: usize, value: T) {
        let mut data = self.data.lock();
        if position < data.len() {
            data[position] = value;
        }
    }

    /// Returns the element at `position` or `None` if it is out of range.
    pub fn get(&self, position: usize) -> Option<T>
    where
        T: Clone,
    {
        self.data.lock().get(position).cloned()
    }

    /// Defensive copy of every element currently in the sequence.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.data.lock().clone()
    }
}

impl<T: Clone> OrderedSequence<T> {
    /// Atomically appends `items`, returning the index the first new item
    /// landed at, or [`ADD_FAILED`] if `items` was empty.
    pub fn add(&self, items: impl IntoIterator<Item = T>) -> i64 {
        let mut data = self.data.lock();
        let mut iter = items.into_iter().peekable();
        if iter.peek().is_none() {
            return ADD_FAILED;
        }
        let start = data.len();
        data.extend(iter);
        start as i64
    }

    /// Convenience wrapper over [`OrderedSequence::add`] for a single item.
    pub fn push(&self, item: T) -> i64 {
        self.add(std::iter::once(item))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_returns_pre_append_length() {
        let seq: OrderedSequence<&str> = OrderedSequence::new();
        assert_eq!(seq.push("a"), 0);
        assert_eq!(seq.push("b"), 1);
        assert_eq!(seq.count(), 2);
    }

    #[test]
    fn add_with_no_items_returns_sentinel() {
        let seq: OrderedSequence<&str> = OrderedSequence::new();
        assert_eq!(seq.add(std::iter::empty()), ADD_FAILED);
        assert_eq!(seq.count(), 0);
    }

    #[test]
    fn out_of_range_reads_are_missing_not_raised() {
        let seq: OrderedSequence<i32> = OrderedSequence::new();
        seq.push(7);
        assert_eq!(seq.get(0), Some(7));
        assert_eq!(seq.get(1), None);
    }

    #[test]
    fn set_out_of_range_is_silent_no_op() {
        let seq: OrderedSequence<i32> = OrderedSequence::new();
        seq.push(1);
        seq.set(5, 99);
        assert_eq!(seq.snapshot(), vec![1]);
    }

    #[test]
    fn set_in_range_round_trips() {
        let seq: OrderedSequence<i32> = OrderedSequence::new();
        seq.push(1);
        seq.push(2);
        seq.set(1, 20);
        assert_eq!(seq.get(1), Some(20));
    }

    #[test]
    fn snapshot_is_a_defensive_copy() {
        let seq: OrderedSequence<i32> = OrderedSequence::new();
        seq.push(1);
        let snap = seq.snapshot();
        seq.push(2);
        assert_eq!(snap, vec![1]);
        assert_eq!(seq.snapshot(), vec![1, 2]);
    }

    #[test]
    fn concurrent_appends_are_linearizable() {
        use std::sync::Arc;
        use std::thread;

        let seq = Arc::new(OrderedSequence::<i32>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = seq.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        seq.push(i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seq.count(), 800);
    }
}
