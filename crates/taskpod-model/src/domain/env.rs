use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::KeyValue;

/// List of environment variables attached to a step, sidecar or container.
///
/// Internally stored as a list of key–value pairs and serialized as a
/// transparent array wrapper. Order is preserved on the wire; lookups scan
/// from the end so later entries override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(transparent)]
pub struct Env(pub Vec<KeyValue>);

impl Env {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all key–value pairs.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Mutable iteration, used by the resolver to substitute placeholders in
    /// variable values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KeyValue> {
        self.0.iter_mut()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Merge template defaults under step-level variables.
    ///
    /// Entries from `self` (the template) are kept only for keys the step
    /// does not set; the step's entries follow in their original order. This
    /// is the key-wise "step wins" merge the assembler applies when folding
    /// a step template into each step.
    pub fn merged_under(&self, step: &Env) -> Env {
        let mut out: Vec<KeyValue> = self
            .0
            .iter()
            .filter(|kv| step.get(kv.key()).is_none())
            .cloned()
            .collect();
        out.extend(step.0.iter().cloned());
        Env(out)
    }
}
