//! OptionStore - hierarchical persisted options with batched change hooks
//!
//! Options are top-level keys with defaults. Callers read and write them by
//! dotted path (`"editor.tabSize"`); only values that differ from their
//! defaults are stored.
//!
//! # Architecture
//!
//! ```text
//!   get/set ──► OptionsStore (handle) ──► store task
//!                                          ├─ OptionsState   overrides + pending batch
//!                                          ├─ InitGate       holds writes until load
//!                                          ├─ notify timer ──► HookRegistry ──► hooks, bus bridge
//!                                          └─ write timer  ──► PersistenceWriter ──► backend
//! ```
//!
//! Both timers are quiescence timers: a burst of sets produces one hook batch
//! and one write once things go quiet.
//!
//! # Example
//!
//! ```ignore
//! use optionstore::{OptionsStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = OptionsStore::open(&StoreConfig::default()).await?;
//! store.hook(|event| { println!("{:?}", event); Ok(()) }).await?;
//! store.set_option("editor.tabSize", json!(4)).await?;
//! assert_eq!(store.get_option("editor.tabSize").await?, Some(json!(4)));
//! ```

pub mod bus;
pub mod changes;
pub mod cli;
pub mod commands;
pub mod config;
pub mod defaults;
pub mod error;
pub mod hooks;
pub mod keypath;
pub mod migration;
pub mod object;
pub mod persistence;
pub mod replica;
pub mod store;

pub use bus::{OptionsBus, OptionsMessage};
pub use changes::ChangeBatch;
pub use commands::{OptionsCommand, SetOptionsEntry, SetOptionsRequest};
pub use config::StoreConfig;
pub use defaults::{Defaults, DefaultsManifest};
pub use error::{StoreError, StoreResponse};
pub use hooks::{HookEvent, HookId};
pub use keypath::KeyPath;
pub use migration::{MigrationRule, Migrations};
pub use persistence::{JsonFileBackend, MemoryBackend, OptionsBackend, STORAGE_KEY};
pub use replica::OptionsReplica;
pub use store::{OptionsMetrics, OptionsStore, SetOutcome, Subscription};

/// Default quiescence delay for hook flushes and write-back (ms)
pub const DEFAULT_DELAY_MS: u64 = 100;
