//! Store requests
//!
//! Requests sent from [`OptionsStore`](super::OptionsStore) handles to the
//! store task.

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use super::core::SetOutcome;
use crate::commands::SetOptionsEntry;
use crate::error::StoreResponse;
use crate::hooks::{HookFn, HookId};
use crate::keypath::KeyPath;

/// Store health and activity counters
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OptionsMetrics {
    /// Persisted snapshot has been merged
    pub ready: bool,
    /// Overrides currently stored
    pub stored_keys: usize,
    /// Changes waiting for the next flush
    pub pending_changes: usize,
    /// Writes waiting for the init gate
    pub deferred_requests: usize,
    /// Registered hooks
    pub hooks: usize,
    /// Batches delivered to hooks
    pub batches_flushed: u64,
    /// Debounced write requests
    pub writes_scheduled: u64,
    /// Writes the backend accepted
    pub writes_completed: u64,
    /// Writes the backend rejected
    pub write_failures: u64,
}

/// Requests handled by the store task
pub enum StoreRequest {
    Load {
        snapshot: Map<String, Value>,
        reply: oneshot::Sender<()>,
    },
    WaitReady {
        reply: oneshot::Sender<()>,
    },
    Get {
        key: KeyPath,
        reply: oneshot::Sender<Option<Value>>,
    },
    GetAll {
        reply: oneshot::Sender<Map<String, Value>>,
    },
    GetStored {
        reply: oneshot::Sender<Map<String, Value>>,
    },
    GetDefault {
        key: KeyPath,
        reply: oneshot::Sender<Option<Value>>,
    },
    Set {
        key: KeyPath,
        value: Value,
        silent: bool,
        reply: oneshot::Sender<SetOutcome>,
    },
    SetMany {
        entries: Vec<SetOptionsEntry>,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    FlushHooks {
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    Hook {
        callback: HookFn,
        initial: bool,
        reply: oneshot::Sender<StoreResponse<HookId>>,
    },
    Unhook {
        id: HookId,
        reply: oneshot::Sender<bool>,
    },
    GetMetrics {
        reply: oneshot::Sender<OptionsMetrics>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl StoreRequest {
    /// Name for tracing
    pub fn name(&self) -> &'static str {
        match self {
            StoreRequest::Load { .. } => "Load",
            StoreRequest::WaitReady { .. } => "WaitReady",
            StoreRequest::Get { .. } => "Get",
            StoreRequest::GetAll { .. } => "GetAll",
            StoreRequest::GetStored { .. } => "GetStored",
            StoreRequest::GetDefault { .. } => "GetDefault",
            StoreRequest::Set { .. } => "Set",
            StoreRequest::SetMany { .. } => "SetMany",
            StoreRequest::FlushHooks { .. } => "FlushHooks",
            StoreRequest::Hook { .. } => "Hook",
            StoreRequest::Unhook { .. } => "Unhook",
            StoreRequest::GetMetrics { .. } => "GetMetrics",
            StoreRequest::Shutdown { .. } => "Shutdown",
        }
    }
}

/// Work held by the init gate until the snapshot is merged
pub(crate) enum Deferred {
    Set {
        key: KeyPath,
        value: Value,
        silent: bool,
        reply: oneshot::Sender<SetOutcome>,
    },
    SetMany {
        entries: Vec<SetOptionsEntry>,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    InitialSnapshot {
        hook: HookId,
    },
    Ready {
        reply: oneshot::Sender<()>,
    },
}
