use std::any::Any;
use std::collections::HashMap;

/// Per-run scratch storage threaded through a pipeline's step invocations,
/// used by the Monitor wrapper to remember the running cumulative weight
/// (and therefore ranking) between steps without widening the `Step`
/// contract. Directly generalizes `libscheduler`'s `CycleState`, which
/// served the same purpose for the `PreScore`/`Score` plugin split.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<T: 'static>(&self, key: &str) -> Option<&T> {
        self.storage.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn write<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.storage.insert(key.to_string(), Box::new(value));
    }
}
