//! Pending change accumulation
//!
//! Changes are keyed by the full dotted key. Re-recording a key moves it to
//! the end, so a batch lists keys in most-recent-write order.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

/// Ordered mapping of dotted keys to their new values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    entries: Vec<(String, Value)>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`, moving it to the end if already present
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.entries.retain(|(existing, _)| *existing != key);
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (key, value) in iter {
            batch.insert(key, value);
        }
        batch
    }
}

impl IntoIterator for ChangeBatch {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for ChangeBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChangeBatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BatchVisitor;

        impl<'de> Visitor<'de> for BatchVisitor {
            type Value = ChangeBatch;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of option keys to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ChangeBatch, A::Error> {
                let mut batch = ChangeBatch::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    batch.insert(key, value);
                }
                Ok(batch)
            }
        }

        deserializer.deserialize_map(BatchVisitor)
    }
}

/// Holds the batch being built between flushes
///
/// `Idle` while empty, `Pending` once the first change lands, back to `Idle`
/// when [`take`](Self::take) swaps the batch out.
#[derive(Debug, Default)]
pub struct ChangeAccumulator {
    pending: Option<ChangeBatch>,
}

impl ChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(%key, "ChangeAccumulator::record: called");
        self.pending.get_or_insert_with(ChangeBatch::new).insert(key, value);
    }

    /// Swap the pending batch out, leaving the accumulator idle
    pub fn take(&mut self) -> Option<ChangeBatch> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.as_ref().map_or(0, ChangeBatch::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reinsert_moves_to_end() {
        let mut batch = ChangeBatch::new();
        batch.insert("a", json!(1));
        batch.insert("b", json!(2));
        batch.insert("a", json!(3));

        let keys: Vec<&str> = batch.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(batch.get("a"), Some(&json!(3)));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_serializes_in_batch_order() {
        let batch: ChangeBatch = [("z", json!(1)), ("a", json!(2))].into_iter().collect();
        assert_eq!(serde_json::to_string(&batch).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_deserialize_keeps_wire_order() {
        let batch: ChangeBatch = serde_json::from_str(r#"{"z":1,"editor.tabSize":4,"a":2}"#).unwrap();
        let keys: Vec<&str> = batch.keys().collect();
        assert_eq!(keys, vec!["z", "editor.tabSize", "a"]);
    }

    #[test]
    fn test_accumulator_lifecycle() {
        let mut acc = ChangeAccumulator::new();
        assert!(!acc.is_pending());
        assert!(acc.take().is_none());

        acc.record("a", json!(1));
        acc.record("b", json!(2));
        assert!(acc.is_pending());
        assert_eq!(acc.len(), 2);

        let batch = acc.take().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!acc.is_pending());
        assert!(acc.take().is_none());
    }
}
