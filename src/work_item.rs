use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::multi_index::MultiIndex;
use crate::ordered_sequence::OrderedSequence;

/// The reserved attribute key under which [`WorkItem::set_error`] stashes a
/// terminal failure description.
pub const ERROR_KEY: &str = "error";

/// The default derivative every freshly-constructed `WorkItem` is born into.
pub const DEFAULT_DERIVATIVE: &str = "";

/// A traced, shared-state envelope carrying keyed attributes of type `V` and
/// an ordered trace of the node identities it has visited.
///
/// Cloning a `WorkItem` clones the handle, not the store: every clone and
/// every [`derivative_copy`](WorkItem::derivative_copy) of the same origin
/// shares one underlying [`MultiIndex`]. This is what lets an async action
/// take ownership of a copy while the node loop keeps the original, and what
/// lets broadcast siblings read each other's namespace on request.
#[derive(Clone)]
pub struct WorkItem<V> {
    id: Uuid,
    index: Arc<MultiIndex<String, V>>,
    derivative: Arc<str>,
    trace: Arc<OrderedSequence<String>>,
}

impl<V> WorkItem<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let index: MultiIndex<String, V> = MultiIndex::new();
        index.create(DEFAULT_DERIVATIVE);
        Self {
            id: Uuid::new_v4(),
            index: Arc::new(index),
            derivative: Arc::from(DEFAULT_DERIVATIVE),
            trace: Arc::new(OrderedSequence::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn derivative(&self) -> &str {
        &self.derivative
    }

    /// Writes `value` under `key` in the current derivative's namespace.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.index.store(&self.derivative, key.into(), value);
    }

    /// Reads `key` from the current derivative's namespace.
    pub fn get(&self, key: &str) -> Option<V> {
        self.index
            .load(&self.derivative, &key.to_string())
            .expect("a WorkItem's own derivative index always exists")
    }

    /// Reads `key` from an arbitrary derivative's namespace, which may be a
    /// sibling's or the origin's.
    pub fn get_in(&self, derivative: &str, key: &str) -> Option<V> {
        self.index.load(derivative, &key.to_string()).ok().flatten()
    }

    /// Stores `err` under the reserved [`ERROR_KEY`] of the current
    /// derivative.
    pub fn set_error(&self, err: V) {
        self.set(ERROR_KEY, err);
    }

    /// Appends `identity` to this item's trace.
    pub fn append_trace(&self, identity: impl Into<String>) {
        self.trace.push(identity.into());
    }

    /// A snapshot of every node identity this item has visited, in order.
    pub fn trace(&self) -> Vec<String> {
        self.trace.snapshot()
    }

    /// A flattened snapshot of every attribute across every derivative this
    /// item's index currently knows about. Duplicate keys across derivatives
    /// collide in last-wins order; this is diagnostic output only.
    pub fn snapshot_all(&self) -> HashMap<String, V> {
        let mut flattened = HashMap::new();
        for name in self.index.list_names() {
            if let Ok(pairs) = self.index.range(&name) {
                for (key, value) in pairs {
                    flattened.insert(key, value);
                }
            }
        }
        flattened
    }

    /// Returns a new `WorkItem` sharing this item's underlying store but
    /// carrying `new_label` as its derivative and a trace seeded from this
    /// item's current trace snapshot (not shared: siblings must not race on
    /// each other's trace appends).
    pub fn derivative_copy(&self, new_label: impl Into<String>) -> Self {
        let new_label = new_label.into();
        self.index.create(&new_label);
        Self {
            id: Uuid::new_v4(),
            index: self.index.clone(),
            derivative: Arc::from(new_label.as_str()),
            trace: Arc::new(OrderedSequence::from_iter(self.trace.snapshot())),
        }
    }
}

impl<V> Default for WorkItem<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
