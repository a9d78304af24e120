//! Read-side mirror of the options for another execution context
//!
//! Seeded with a full `GetAllOptions` snapshot, then kept current by applying
//! each `UpdateOptions` batch. Consistency is eventual: a replica is only as
//! fresh as the last batch it received.

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::bus::OptionsMessage;
use crate::changes::ChangeBatch;
use crate::keypath::KeyPath;
use crate::object::{object_get, object_set};

#[derive(Debug, Clone, Default)]
pub struct OptionsReplica {
    values: Value,
    applied: u64,
}

impl OptionsReplica {
    pub fn new(snapshot: Map<String, Value>) -> Self {
        Self {
            values: Value::Object(snapshot),
            applied: 0,
        }
    }

    /// Apply a batch in order, each dotted key replacing its subtree
    pub fn apply(&mut self, batch: &ChangeBatch) {
        debug!(changes = batch.len(), "OptionsReplica::apply: called");
        for (key, value) in batch.iter() {
            let path = KeyPath::parse(key);
            if !object_set(&mut self.values, path.segments(), value.clone()) {
                debug!(%key, "OptionsReplica::apply: path not writable, skipping");
            }
        }
        self.applied += 1;
    }

    pub fn handle(&mut self, message: &OptionsMessage) {
        match message {
            OptionsMessage::UpdateOptions(batch) => self.apply(batch),
        }
    }

    pub fn get(&self, key: impl Into<KeyPath>) -> Option<&Value> {
        let key = key.into();
        object_get(&self.values, key.segments())
    }

    /// Batches applied so far
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn snapshot(&self) -> Option<&Map<String, Value>> {
        self.values.as_object()
    }

    /// Apply bus traffic until the bus closes
    ///
    /// A lagged receiver has missed batches; the replica keeps going but is
    /// stale for whatever those batches touched.
    pub async fn follow(&mut self, mut rx: broadcast::Receiver<OptionsMessage>) {
        loop {
            match rx.recv().await {
                Ok(message) => self.handle(&message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Replica lagged behind the options bus");
                }
                Err(RecvError::Closed) => {
                    debug!("OptionsReplica::follow: bus closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OptionsBus;
    use serde_json::json;

    fn replica() -> OptionsReplica {
        let Value::Object(snapshot) = json!({"a": {"b": 1, "c": 2}, "theme": "system"}) else {
            unreachable!()
        };
        OptionsReplica::new(snapshot)
    }

    #[test]
    fn test_apply_dotted_and_top_level() {
        let mut replica = replica();
        let batch: ChangeBatch = [("a.b", json!(5)), ("theme", json!("dark"))].into_iter().collect();
        replica.apply(&batch);

        assert_eq!(replica.get("a.b"), Some(&json!(5)));
        assert_eq!(replica.get("a.c"), Some(&json!(2)));
        assert_eq!(replica.get("theme"), Some(&json!("dark")));
        assert_eq!(replica.applied(), 1);
    }

    #[test]
    fn test_later_entry_wins() {
        let mut replica = replica();
        let batch: ChangeBatch = [("a", json!({"b": 9})), ("a.c", json!(3))].into_iter().collect();
        replica.apply(&batch);
        assert_eq!(replica.get("a"), Some(&json!({"b": 9, "c": 3})));
    }

    #[tokio::test]
    async fn test_follow_until_closed() {
        let bus = OptionsBus::new(8);
        let rx = bus.subscribe();
        bus.emit(OptionsMessage::UpdateOptions([("theme", json!("light"))].into_iter().collect()));
        drop(bus);

        let mut replica = replica();
        replica.follow(rx).await;
        assert_eq!(replica.get("theme"), Some(&json!("light")));
    }
}
