//! Change broadcast to other execution contexts
//!
//! The store only guarantees that each flushed batch reaches its local hooks.
//! The bridge hook installed by [`OptionsStore::hook_bus`] forwards batches
//! onto this bus; whatever carries the bus across contexts is the transport's
//! concern.
//!
//! [`OptionsStore::hook_bus`]: crate::store::OptionsStore::hook_bus

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::changes::ChangeBatch;
use crate::config::StoreConfig;

/// Default bus capacity (messages)
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Notifications sent to other contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum OptionsMessage {
    /// A flushed change batch, keyed by dotted key
    UpdateOptions(ChangeBatch),
}

impl OptionsMessage {
    pub fn name(&self) -> &'static str {
        match self {
            OptionsMessage::UpdateOptions(_) => "UpdateOptions",
        }
    }
}

pub struct OptionsBus {
    tx: broadcast::Sender<OptionsMessage>,
}

impl OptionsBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "OptionsBus::new: creating bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.bus_capacity)
    }

    /// Fire-and-forget; dropped when nobody is subscribed
    pub fn emit(&self, message: OptionsMessage) {
        debug!(message = message.name(), "OptionsBus::emit");
        let _ = self.tx.send(message);
    }

    /// Receive every message emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<OptionsMessage> {
        debug!("OptionsBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Sender for emitting from inside a hook
    pub fn sender(&self) -> broadcast::Sender<OptionsMessage> {
        self.tx.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for OptionsBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update() -> OptionsMessage {
        OptionsMessage::UpdateOptions([("editor.tabSize", json!(4))].into_iter().collect())
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&update()).unwrap();
        assert_eq!(json, r#"{"cmd":"UpdateOptions","data":{"editor.tabSize":4}}"#);

        let parsed: OptionsMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, update());
    }

    #[test]
    fn test_from_config_capacity() {
        let config = StoreConfig {
            bus_capacity: 2,
            ..Default::default()
        };
        let bus = OptionsBus::from_config(&config);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.emit(update());
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = OptionsBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(update());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = OptionsBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(update());

        assert_eq!(rx1.recv().await.unwrap(), update());
        assert_eq!(rx2.recv().await.unwrap(), update());
    }
}
