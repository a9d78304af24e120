//! Write-back of the stored options
//!
//! The whole override map lives under a single backend key. Writes are
//! debounced by the store task and performed here, in order, on a background
//! task. Failures are logged and counted; they never touch in-memory state and
//! are not retried.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::store::Debouncer;

/// Backend key holding the options map
pub const STORAGE_KEY: &str = "options";

/// External key/value storage
#[async_trait]
pub trait OptionsBackend: Send + Sync {
    /// Everything stored, keyed the same way writes are
    async fn initial_state(&self) -> Result<Map<String, Value>>;

    /// Idempotently replace one key
    async fn set_one(&self, key: &str, value: Value) -> Result<()>;
}

/// Single JSON document on disk
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = %self.path.display(), "JsonFileBackend: no store file yet");
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = serde_json::from_str(&content).context("Failed to parse store file")?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(eyre::eyre!("Store file is not a JSON object: {}", other)),
        }
    }
}

#[async_trait]
impl OptionsBackend for JsonFileBackend {
    async fn initial_state(&self) -> Result<Map<String, Value>> {
        self.read_all().await
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<()> {
        debug!(%key, path = %self.path.display(), "JsonFileBackend::set_one: called");
        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.context("Failed to create store directory")?;
        }

        // Write to a sibling then rename so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&Value::Object(all))?;
        fs::write(&tmp, content).await.context("Failed to write store file")?;
        fs::rename(&tmp, &self.path).await.context("Failed to replace store file")?;
        Ok(())
    }
}

/// In-process backend that records every write
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<Map<String, Value>>,
    writes: Mutex<Vec<(String, Value)>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a persisted options map
    pub fn with_options(options: Map<String, Value>) -> Self {
        let backend = Self::default();
        if let Ok(mut data) = backend.data.lock() {
            data.insert(STORAGE_KEY.to_string(), Value::Object(options));
        }
        backend
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every successful write, oldest first
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().ok().and_then(|d| d.get(key).cloned())
    }
}

#[async_trait]
impl OptionsBackend for MemoryBackend {
    async fn initial_state(&self) -> Result<Map<String, Value>> {
        self.data
            .lock()
            .map(|d| d.clone())
            .map_err(|_| eyre::eyre!("Memory backend lock poisoned"))
    }

    async fn set_one(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(eyre::eyre!("Simulated write failure for {}", key));
        }
        self.data
            .lock()
            .map_err(|_| eyre::eyre!("Memory backend lock poisoned"))?
            .insert(key.to_string(), value.clone());
        self.writes
            .lock()
            .map_err(|_| eyre::eyre!("Memory backend lock poisoned"))?
            .push((key.to_string(), value));
        Ok(())
    }
}

/// Write counters shared with the writer task
#[derive(Debug, Default)]
pub struct WriteStats {
    pub scheduled: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

enum WriteJob {
    Write(Value),
    Sync(oneshot::Sender<()>),
}

/// Debounced writer of the full options map
pub struct PersistenceWriter {
    debounce: Debouncer,
    tx: mpsc::UnboundedSender<WriteJob>,
    stats: Arc<WriteStats>,
}

impl PersistenceWriter {
    /// Spawn the background writer task
    pub fn spawn(backend: Arc<dyn OptionsBackend>, delay: Duration) -> Self {
        debug!(?delay, "PersistenceWriter::spawn: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WriteStats::default());
        tokio::spawn(writer_loop(backend, rx, stats.clone()));
        Self {
            debounce: Debouncer::new(delay),
            tx,
            stats,
        }
    }

    /// Push the write deadline out by the full delay
    pub fn schedule(&mut self) {
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
        self.debounce.schedule();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn is_scheduled(&self) -> bool {
        self.debounce.is_scheduled()
    }

    /// True once the quiet period has elapsed; clears the deadline
    pub fn take_due(&mut self) -> bool {
        self.debounce.take_due()
    }

    /// Hand a snapshot to the writer task, fire-and-forget
    pub fn write(&mut self, options: &Map<String, Value>) {
        self.debounce.clear();
        if self.tx.send(WriteJob::Write(Value::Object(options.clone()))).is_err() {
            warn!("Persistence writer has stopped; dropping write");
        }
    }

    /// Wait until every write handed over so far has finished
    pub async fn sync(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(WriteJob::Sync(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }
}

async fn writer_loop(backend: Arc<dyn OptionsBackend>, mut rx: mpsc::UnboundedReceiver<WriteJob>, stats: Arc<WriteStats>) {
    debug!("writer_loop: started");
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::Write(options) => match backend.set_one(STORAGE_KEY, options).await {
                Ok(()) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!("writer_loop: options written");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Failed to persist options");
                }
            },
            WriteJob::Sync(reply) => {
                let _ = reply.send(());
            }
        }
    }
    debug!("writer_loop: stopped");
}
