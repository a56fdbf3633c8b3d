use std::collections::HashMap;
use std::sync::Arc;

use grist_edge::ValueComparator;

/// Named secondary sort predicates consulted when resolving scatter-gather
/// edges. Ports reference comparators by name; the names must all be
/// registered before the run starts.
#[derive(Default, Clone)]
pub struct ComparatorRegistry {
    map: HashMap<String, ValueComparator>,
}

impl ComparatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `less` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, less: F)
    where
        F: Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static,
    {
        self.map.insert(name.to_string(), Arc::new(less));
    }

    pub fn get(&self, name: &str) -> Option<ValueComparator> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}
