//! OptionsStore - handle to the task that owns all option state
//!
//! One task owns the stored overrides, the pending batch, the hooks, the init
//! gate and both quiescence timers. Handles are cheap to clone and talk to it
//! over a channel, so no state is ever shared or locked.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::core::{OptionsState, SetOutcome};
use super::debounce::{Debouncer, sleep_until_deadline};
use super::gate::InitGate;
use super::messages::{Deferred, OptionsMetrics, StoreRequest};
use crate::bus::{OptionsBus, OptionsMessage};
use crate::commands::{OptionsCommand, SetOptionsEntry, SetOptionsRequest};
use crate::config::StoreConfig;
use crate::defaults::{Defaults, DefaultsManifest};
use crate::error::{StoreError, StoreResponse};
use crate::hooks::{HookEvent, HookId, HookRegistry};
use crate::keypath::KeyPath;
use crate::migration::Migrations;
use crate::persistence::{JsonFileBackend, OptionsBackend, PersistenceWriter, STORAGE_KEY};

/// Handle to send requests to the store task
#[derive(Clone)]
pub struct OptionsStore {
    tx: mpsc::Sender<StoreRequest>,
    backend: Arc<dyn OptionsBackend>,
}

/// A registered hook; dropping it leaves the hook installed
pub struct Subscription {
    id: HookId,
    tx: mpsc::Sender<StoreRequest>,
}

impl Subscription {
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Remove the hook; false if it was already gone
    pub async fn unsubscribe(self) -> StoreResponse<bool> {
        debug!(hook = self.id, "Subscription::unsubscribe: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StoreRequest::Unhook {
                id: self.id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)
    }
}

impl OptionsStore {
    /// Spawn the store task in the `Loading` state
    ///
    /// Writes are held until [`load`](Self::load) or
    /// [`load_from_backend`](Self::load_from_backend) merges the snapshot.
    pub fn spawn(
        defaults: Defaults,
        migrations: Migrations,
        backend: Arc<dyn OptionsBackend>,
        config: &StoreConfig,
    ) -> Self {
        debug!(
            defaults = defaults.len(),
            notify_delay_ms = config.notify_delay_ms,
            write_delay_ms = config.write_delay_ms,
            "OptionsStore::spawn: called"
        );
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));

        let task = StoreTask {
            state: OptionsState::new(defaults, migrations),
            hooks: HookRegistry::new(),
            gate: InitGate::new(),
            notify: Debouncer::new(config.notify_delay()),
            writer: PersistenceWriter::spawn(backend.clone(), config.write_delay()),
            batches_flushed: 0,
        };
        tokio::spawn(task.run(rx));

        info!("OptionsStore spawned");
        Self { tx, backend }
    }

    /// Spawn against the configured file and defaults, then load
    pub async fn open(config: &StoreConfig) -> eyre::Result<Self> {
        let (defaults, migrations) = DefaultsManifest::load(config.defaults_path.as_deref())?.into_parts();
        let backend = Arc::new(JsonFileBackend::new(&config.store_path));
        info!(path = %backend.path().display(), "Opening options store");
        let store = Self::spawn(defaults, migrations, backend, config);
        store.load_from_backend().await?;
        Ok(store)
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StoreRequest) -> StoreResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)
    }

    // === Initialization ===

    /// Merge a persisted options map and open the init gate
    pub async fn load(&self, snapshot: Map<String, Value>) -> StoreResponse<()> {
        debug!(keys = snapshot.len(), "load: called");
        self.call(|reply| StoreRequest::Load { snapshot, reply }).await
    }

    /// Read the initial state from the backend and load it
    pub async fn load_from_backend(&self) -> StoreResponse<()> {
        debug!("load_from_backend: called");
        let state = self
            .backend
            .initial_state()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let snapshot = match state.get(STORAGE_KEY) {
            Some(Value::Object(map)) => map.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                warn!(value = %other, "Persisted options are not an object, starting empty");
                Map::new()
            }
        };
        self.load(snapshot).await
    }

    /// Resolves once the persisted snapshot has been merged
    pub async fn wait_ready(&self) -> StoreResponse<()> {
        self.call(|reply| StoreRequest::WaitReady { reply }).await
    }

    // === Reads (never gated) ===

    /// Effective value at `key`
    pub async fn get_option(&self, key: impl Into<KeyPath>) -> StoreResponse<Option<Value>> {
        let key = key.into();
        debug!(%key, "get_option: called");
        self.call(|reply| StoreRequest::Get { key, reply }).await
    }

    /// Every default overlaid with the stored overrides
    pub async fn get_all_options(&self) -> StoreResponse<Map<String, Value>> {
        debug!("get_all_options: called");
        self.call(|reply| StoreRequest::GetAll { reply }).await
    }

    /// Only the overrides that differ from their defaults
    pub async fn stored_options(&self) -> StoreResponse<Map<String, Value>> {
        self.call(|reply| StoreRequest::GetStored { reply }).await
    }

    /// Default at `key`, regardless of any stored override
    pub async fn default_of(&self, key: impl Into<KeyPath>) -> StoreResponse<Option<Value>> {
        let key = key.into();
        debug!(%key, "default_of: called");
        self.call(|reply| StoreRequest::GetDefault { key, reply }).await
    }

    // === Writes ===

    /// Set `key` and schedule a debounced hook flush
    ///
    /// Before load completes this does not resolve until the write has been
    /// replayed.
    pub async fn set_option(&self, key: impl Into<KeyPath>, value: Value) -> StoreResponse<SetOutcome> {
        self.set(key.into(), value, false).await
    }

    /// Set `key` without scheduling a flush; call [`flush_hooks`](Self::flush_hooks) afterwards
    pub async fn set_option_silent(&self, key: impl Into<KeyPath>, value: Value) -> StoreResponse<SetOutcome> {
        self.set(key.into(), value, true).await
    }

    async fn set(&self, key: KeyPath, value: Value, silent: bool) -> StoreResponse<SetOutcome> {
        debug!(%key, %value, silent, "set_option: called");
        self.call(|reply| StoreRequest::Set {
            key,
            value,
            silent,
            reply,
        })
        .await
    }

    /// Apply every entry in order, then flush hooks once
    ///
    /// A failing hook is returned here even though the values were applied.
    pub async fn set_options(&self, request: impl Into<SetOptionsRequest>) -> StoreResponse<()> {
        let entries = request.into().into_entries();
        debug!(count = entries.len(), "set_options: called");
        self.call(|reply| StoreRequest::SetMany { entries, reply }).await?
    }

    /// Deliver the pending batch now
    pub async fn flush_hooks(&self) -> StoreResponse<()> {
        debug!("flush_hooks: called");
        self.call(|reply| StoreRequest::FlushHooks { reply }).await?
    }

    // === Hooks ===

    /// Register a hook for change batches
    pub async fn hook<F>(&self, callback: F) -> StoreResponse<Subscription>
    where
        F: FnMut(&HookEvent) -> eyre::Result<()> + Send + 'static,
    {
        self.register(Box::new(callback), false).await
    }

    /// Register a hook that first receives every effective option
    ///
    /// The snapshot call happens once load completes. If the store is already
    /// loaded and that call fails, the hook is not registered.
    pub async fn hook_with_snapshot<F>(&self, callback: F) -> StoreResponse<Subscription>
    where
        F: FnMut(&HookEvent) -> eyre::Result<()> + Send + 'static,
    {
        self.register(Box::new(callback), true).await
    }

    async fn register(&self, callback: crate::hooks::HookFn, initial: bool) -> StoreResponse<Subscription> {
        debug!(initial, "hook: called");
        let id = self
            .call(|reply| StoreRequest::Hook {
                callback,
                initial,
                reply,
            })
            .await??;
        Ok(Subscription {
            id,
            tx: self.tx.clone(),
        })
    }

    /// Forward every flushed batch onto `bus` as an `UpdateOptions` message
    pub async fn hook_bus(&self, bus: &OptionsBus) -> StoreResponse<Subscription> {
        debug!("hook_bus: called");
        let sender = bus.sender();
        self.hook(move |event| {
            if let Some(batch) = event.changes() {
                // No receivers is fine; other contexts may not be listening yet
                let _ = sender.send(OptionsMessage::UpdateOptions(batch.clone()));
            }
            Ok(())
        })
        .await
    }

    // === Command surface ===

    /// Execute a remote command and produce its JSON reply
    pub async fn dispatch(&self, command: OptionsCommand) -> StoreResponse<Value> {
        debug!(command = command.name(), "dispatch: called");
        match command {
            OptionsCommand::GetAllOptions => Ok(Value::Object(self.get_all_options().await?)),
            OptionsCommand::SetOptions(request) => {
                self.set_options(request).await?;
                Ok(Value::Null)
            }
        }
    }

    /// Parse a `{"cmd","data"}` message and execute it
    pub async fn dispatch_json(&self, raw: &str) -> StoreResponse<Value> {
        let command: OptionsCommand = serde_json::from_str(raw)?;
        self.dispatch(command).await
    }

    // === Lifecycle ===

    pub async fn metrics(&self) -> StoreResponse<OptionsMetrics> {
        self.call(|reply| StoreRequest::GetMetrics { reply }).await
    }

    /// Flush pending changes and writes, then stop the task
    pub async fn shutdown(&self) -> StoreResponse<()> {
        debug!("shutdown: called");
        self.call(|reply| StoreRequest::Shutdown { reply }).await
    }
}

struct StoreTask {
    state: OptionsState,
    hooks: HookRegistry,
    gate: InitGate<Deferred>,
    notify: Debouncer,
    writer: PersistenceWriter,
    batches_flushed: u64,
}

impl StoreTask {
    async fn run(mut self, mut rx: mpsc::Receiver<StoreRequest>) {
        debug!("Options store task started");

        loop {
            tokio::select! {
                req = rx.recv() => match req {
                    Some(StoreRequest::Shutdown { reply }) => {
                        self.finish().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(req) => self.handle(req),
                    None => {
                        self.finish().await;
                        break;
                    }
                },
                _ = sleep_until_deadline(self.notify.deadline()) => {
                    if self.notify.take_due()
                        && let Err(e) = self.flush_hooks()
                    {
                        warn!(error = %e, "Hook failed during scheduled flush");
                    }
                }
                _ = sleep_until_deadline(self.writer.deadline()) => {
                    if self.writer.take_due() {
                        self.writer.write(self.state.stored());
                    }
                }
            }
        }

        info!("Options store stopped");
    }

    fn handle(&mut self, req: StoreRequest) {
        debug!(request = req.name(), "handle: called");
        match req {
            StoreRequest::Load { snapshot, reply } => {
                self.load(snapshot);
                let _ = reply.send(());
            }

            StoreRequest::WaitReady { reply } => {
                if self.gate.is_ready() {
                    let _ = reply.send(());
                } else {
                    self.gate.defer(Deferred::Ready { reply });
                }
            }

            StoreRequest::Get { key, reply } => {
                let _ = reply.send(self.state.get_option(&key));
            }

            StoreRequest::GetAll { reply } => {
                let _ = reply.send(self.state.effective_snapshot());
            }

            StoreRequest::GetStored { reply } => {
                let _ = reply.send(self.state.stored().clone());
            }

            StoreRequest::GetDefault { key, reply } => {
                let _ = reply.send(self.state.default_option(&key));
            }

            StoreRequest::Set {
                key,
                value,
                silent,
                reply,
            } => {
                if self.gate.is_ready() {
                    let _ = reply.send(self.apply_set(&key, value, silent));
                } else {
                    self.gate.defer(Deferred::Set {
                        key,
                        value,
                        silent,
                        reply,
                    });
                }
            }

            StoreRequest::SetMany { entries, reply } => {
                if self.gate.is_ready() {
                    let _ = reply.send(self.apply_many(entries));
                } else {
                    self.gate.defer(Deferred::SetMany { entries, reply });
                }
            }

            StoreRequest::FlushHooks { reply } => {
                let _ = reply.send(self.flush_hooks());
            }

            StoreRequest::Hook {
                callback,
                initial,
                reply,
            } => {
                let id = self.hooks.hook(callback);
                if !initial {
                    let _ = reply.send(Ok(id));
                } else if self.gate.is_ready() {
                    let event = HookEvent::Snapshot(self.state.effective_snapshot());
                    let result = self.hooks.fire_one(id, &event);
                    if result.is_err() {
                        self.hooks.unhook(id);
                    }
                    let _ = reply.send(result.map(|_| id));
                } else {
                    self.gate.defer(Deferred::InitialSnapshot { hook: id });
                    let _ = reply.send(Ok(id));
                }
            }

            StoreRequest::Unhook { id, reply } => {
                let _ = reply.send(self.hooks.unhook(id));
            }

            StoreRequest::GetMetrics { reply } => {
                let _ = reply.send(self.metrics());
            }

            StoreRequest::Shutdown { .. } => {
                unreachable!("shutdown is handled by the run loop");
            }
        }
    }

    fn load(&mut self, snapshot: Map<String, Value>) {
        if self.gate.is_ready() {
            warn!("Options already loaded, ignoring snapshot");
            return;
        }

        let outcome = self.state.merge_snapshot(snapshot);
        if outcome.needs_write {
            debug!("load: stored footprint shrank, scheduling write");
            self.writer.schedule();
        }
        info!(stored = self.state.stored().len(), "Options loaded");

        for deferred in self.gate.open() {
            self.replay(deferred);
        }

        if outcome.needs_version && self.state.bootstrap_version().is_updated() {
            self.writer.schedule();
            self.notify.schedule();
        }
    }

    fn replay(&mut self, deferred: Deferred) {
        match deferred {
            Deferred::Set {
                key,
                value,
                silent,
                reply,
            } => {
                let _ = reply.send(self.apply_set(&key, value, silent));
            }
            Deferred::SetMany { entries, reply } => {
                let _ = reply.send(self.apply_many(entries));
            }
            Deferred::InitialSnapshot { hook } => {
                let event = HookEvent::Snapshot(self.state.effective_snapshot());
                if let Err(e) = self.hooks.fire_one(hook, &event) {
                    warn!(hook, error = %e, "Hook failed on initial snapshot");
                }
            }
            Deferred::Ready { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn apply_set(&mut self, key: &KeyPath, value: Value, silent: bool) -> SetOutcome {
        let outcome = self.state.set_option(key, value);
        if outcome.is_updated() {
            self.writer.schedule();
            if !silent {
                self.notify.schedule();
            }
        }
        outcome
    }

    fn apply_many(&mut self, entries: Vec<SetOptionsEntry>) -> StoreResponse<()> {
        for entry in entries {
            self.apply_set(&entry.key, entry.value, entry.reply);
        }
        self.flush_hooks()
    }

    /// Swap out the pending batch and deliver it to every hook
    fn flush_hooks(&mut self) -> StoreResponse<()> {
        self.notify.clear();
        let Some(batch) = self.state.take_changes() else {
            return Ok(());
        };
        self.batches_flushed += 1;
        if self.hooks.is_empty() {
            debug!(changes = batch.len(), "flush_hooks: no hooks registered");
            return Ok(());
        }
        debug!(changes = batch.len(), "flush_hooks: delivering batch");
        self.hooks.fire(&HookEvent::Changes(batch))
    }

    async fn finish(&mut self) {
        info!("Options store shutting down");
        if self.notify.is_scheduled()
            && let Err(e) = self.flush_hooks()
        {
            warn!(error = %e, "Hook failed during shutdown flush");
        }
        if self.writer.is_scheduled() {
            self.writer.write(self.state.stored());
        }
        self.writer.sync().await;
    }

    fn metrics(&self) -> OptionsMetrics {
        let stats = self.writer.stats();
        OptionsMetrics {
            ready: self.gate.is_ready(),
            stored_keys: self.state.stored().len(),
            pending_changes: self.state.pending_changes(),
            deferred_requests: self.gate.queued(),
            hooks: self.hooks.len(),
            batches_flushed: self.batches_flushed,
            writes_scheduled: stats.scheduled.load(Ordering::Relaxed),
            writes_completed: stats.completed.load(Ordering::Relaxed),
            write_failures: stats.failed.load(Ordering::Relaxed),
        }
    }
}
