//! Change subscribers
//!
//! Hooks run synchronously inside the store task. A batch is delivered to every
//! hook in registration order; the first failure stops delivery and is handed
//! back to whoever triggered the flush.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::changes::ChangeBatch;
use crate::error::{StoreError, StoreResponse};

/// Identifies a registered hook
pub type HookId = u64;

/// Callback invoked with each event
pub type HookFn = Box<dyn FnMut(&HookEvent) -> eyre::Result<()> + Send>;

/// What a hook receives
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    /// One-shot initial delivery of every effective option
    Snapshot(Map<String, Value>),
    /// A flushed batch of changes, keyed by dotted key
    Changes(ChangeBatch),
}

impl HookEvent {
    /// True for the synthetic initial call
    pub fn is_initial(&self) -> bool {
        matches!(self, HookEvent::Snapshot(_))
    }

    pub fn changes(&self) -> Option<&ChangeBatch> {
        match self {
            HookEvent::Changes(batch) => Some(batch),
            HookEvent::Snapshot(_) => None,
        }
    }
}

/// Registered hooks, keyed by id in registration order
#[derive(Default)]
pub struct HookRegistry {
    next_id: HookId,
    hooks: BTreeMap<HookId, HookFn>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&mut self, callback: HookFn) -> HookId {
        self.next_id += 1;
        let id = self.next_id;
        debug!(hook = id, "HookRegistry::hook: registered");
        self.hooks.insert(id, callback);
        id
    }

    /// Returns false if the hook was already gone
    pub fn unhook(&mut self, id: HookId) -> bool {
        debug!(hook = id, "HookRegistry::unhook: called");
        self.hooks.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Deliver `event` to every hook, stopping at the first failure
    pub fn fire(&mut self, event: &HookEvent) -> StoreResponse<()> {
        debug!(hooks = self.hooks.len(), initial = event.is_initial(), "HookRegistry::fire: called");
        for (id, hook) in self.hooks.iter_mut() {
            hook(event).map_err(|e| StoreError::HookFailed {
                hook: *id,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Deliver `event` to a single hook; a missing hook is not an error
    pub fn fire_one(&mut self, id: HookId, event: &HookEvent) -> StoreResponse<()> {
        debug!(hook = id, "HookRegistry::fire_one: called");
        match self.hooks.get_mut(&id) {
            Some(hook) => hook(event).map_err(|e| StoreError::HookFailed {
                hook: id,
                message: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}
