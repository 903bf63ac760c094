//! Shared variable environment.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use stencil_foundation::coercion::to_display_string;
use stencil_foundation::{RESULT_ACCUMULATOR, Value};

/// Variables shared by every block of one template run, including the `tR`
/// result accumulator.
///
/// Cloning is cheap and yields a handle to the same map. Concurrent blocks
/// write disjoint names (the scheduler guarantees it), so the map's own
/// sharding is the only synchronization.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Arc<DashMap<String, Value>>,
}

impl Environment {
    pub fn new() -> Self {
        let env = Self::default();
        env.set(RESULT_ACCUMULATOR, Value::from(""));
        env
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|v| v.value().clone())
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.remove(name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Current contents of `tR`.
    pub fn accumulator(&self) -> String {
        self.get(RESULT_ACCUMULATOR)
            .map(|v| to_display_string(&v))
            .unwrap_or_default()
    }

    /// Append to `tR` in place.
    pub fn append_accumulator(&self, text: &str) {
        self.vars
            .entry(RESULT_ACCUMULATOR.to_string())
            .and_modify(|current| {
                let mut s = to_display_string(current);
                s.push_str(text);
                *current = Value::from(s);
            })
            .or_insert_with(|| Value::from(text));
    }

    pub fn set_accumulator(&self, text: &str) {
        self.set(RESULT_ACCUMULATOR, Value::from(text));
    }

    /// Sorted copy of every variable, for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.vars
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
