use ahash::AHashMap;
use parking_lot::RwLock;

use crate::graph::{Edge, NodeId};

/// Per-node edge lists keyed by the node they were read for. Cleared on every
/// write to the store.
#[derive(Default)]
pub struct AdjacencyCache {
    inner: RwLock<AHashMap<NodeId, Vec<Edge>>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, key: NodeId) -> Option<Vec<Edge>> {
        self.inner.read().get(&key).cloned()
    }

    pub fn insert(&self, key: NodeId, value: Vec<Edge>) {
        self.inner.write().insert(key, value);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
