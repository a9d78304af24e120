//! Options engine
//!
//! Owns the stored overrides and the pending change batch. Everything here is
//! synchronous; timers, gating and persistence live in the store task.
//!
//! Stored overrides never deep-equal their default: a write that would make
//! them equal removes the entry instead.

use serde_json::{Map, Value};
use tracing::debug;

use crate::changes::{ChangeAccumulator, ChangeBatch};
use crate::defaults::Defaults;
use crate::keypath::KeyPath;
use crate::migration::{INITIAL_VERSION, Migrations, VERSION_KEY};
use crate::object::{deep_equal, is_truthy, object_get, object_set};

/// Result of a single set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Main key is not a known option; nothing happened
    Unknown,
    /// Value already effective; nothing happened
    Unchanged,
    /// Path addresses an array slot that cannot be written; nothing happened
    Rejected,
    /// Stored, queued for write-back and recorded as a change
    Updated,
}

impl SetOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SetOutcome::Updated)
    }
}

/// What merging the persisted snapshot found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Footprint shrank during load and should be written back
    pub needs_write: bool,
    /// No version marker was present
    pub needs_version: bool,
}

pub struct OptionsState {
    defaults: Defaults,
    migrations: Migrations,
    options: Map<String, Value>,
    changes: ChangeAccumulator,
}

impl OptionsState {
    pub fn new(defaults: Defaults, migrations: Migrations) -> Self {
        debug!(defaults = defaults.len(), "OptionsState::new: called");
        Self {
            defaults,
            migrations,
            options: Map::new(),
            changes: ChangeAccumulator::new(),
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Stored overrides only
    pub fn stored(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Effective value of `key`; `None` when the path leads nowhere
    ///
    /// A stored `null` is not an override: the default shows through.
    pub fn get_option(&self, key: &KeyPath) -> Option<Value> {
        if let Some(exact) = self.options.get(&key.dotted())
            && !exact.is_null()
        {
            return Some(exact.clone());
        }
        let main = self.main_value(key.main_key())?;
        if key.has_sub_path() {
            object_get(&main, key.sub_path()).cloned()
        } else {
            Some(main)
        }
    }

    fn main_value(&self, main_key: &str) -> Option<Value> {
        match self.options.get(main_key) {
            Some(stored) if !stored.is_null() => Some(stored.clone()),
            _ => self.defaults.copy_of(main_key),
        }
    }

    /// Set `key` to `value` and record the change
    ///
    /// The caller decides when the change is flushed and written back.
    pub fn set_option(&mut self, key: &KeyPath, value: Value) -> SetOutcome {
        let main_key = key.main_key();
        let dotted = key.dotted();
        if !self.defaults.contains(main_key) {
            debug!(key = %dotted, %value, "Unknown option");
            return SetOutcome::Unknown;
        }

        let mut main_value = self.main_value(main_key).unwrap_or(Value::Null);
        let current = if key.has_sub_path() {
            object_get(&main_value, key.sub_path())
        } else {
            Some(&main_value)
        };
        if current.is_some_and(|current| deep_equal(current, &value)) {
            debug!(key = %dotted, %value, "Option unchanged");
            return SetOutcome::Unchanged;
        }

        let new_main = if key.has_sub_path() {
            if !object_set(&mut main_value, key.sub_path(), value.clone()) {
                debug!(key = %dotted, "Option path not writable");
                return SetOutcome::Rejected;
            }
            main_value
        } else {
            value.clone()
        };
        self.options.insert(main_key.to_string(), new_main);
        self.omit_default_value(main_key);

        debug!(key = %dotted, %value, "Options updated");
        self.changes.record(dotted, value);
        SetOutcome::Updated
    }

    /// Drop the stored entry for `key` if it equals the default
    fn omit_default_value(&mut self, key: &str) -> bool {
        let is_default = match (self.options.get(key), self.defaults.get(key)) {
            (Some(stored), Some(default)) => deep_equal(stored, default),
            _ => false,
        };
        if is_default {
            debug!(%key, "Stripping default value");
            self.options.remove(key);
        }
        is_default
    }

    /// Merge the persisted snapshot into the stored overrides
    pub fn merge_snapshot(&mut self, snapshot: Map<String, Value>) -> LoadOutcome {
        debug!(keys = snapshot.len(), "OptionsState::merge_snapshot: called");
        self.options.extend(snapshot);

        let needs_version = !is_truthy(self.options.get(VERSION_KEY));
        let migrated = self.migrations.apply(&mut self.options, &self.defaults);

        let keys: Vec<String> = self.options.keys().cloned().collect();
        let mut stripped = false;
        for key in keys {
            stripped |= self.omit_default_value(&key);
        }

        LoadOutcome {
            needs_write: stripped || migrated,
            needs_version,
        }
    }

    /// First-run bootstrap of the version marker
    pub fn bootstrap_version(&mut self) -> SetOutcome {
        self.set_option(&KeyPath::parse(VERSION_KEY), Value::from(INITIAL_VERSION))
    }

    /// All defaults overlaid with the stored overrides
    pub fn effective_snapshot(&self) -> Map<String, Value> {
        let mut all = self.defaults.as_map().clone();
        for (key, value) in &self.options {
            if value.is_null() && all.contains_key(key) {
                continue;
            }
            all.insert(key.clone(), value.clone());
        }
        all
    }

    /// Copy of the default at `key`, ignoring any stored override
    pub fn default_option(&self, key: &KeyPath) -> Option<Value> {
        let main = self.defaults.copy_of(key.main_key())?;
        if key.has_sub_path() {
            object_get(&main, key.sub_path()).cloned()
        } else {
            Some(main)
        }
    }

    /// Swap out the pending batch
    pub fn take_changes(&mut self) -> Option<ChangeBatch> {
        self.changes.take()
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationRule;
    use serde_json::json;

    fn state() -> OptionsState {
        let defaults = Defaults::from_value(json!({
            "version": 1,
            "a": {"b": 1, "c": 2},
            "theme": "system",
            "list": [1, 2, 3],
        }));
        OptionsState::new(defaults, Migrations::default())
    }

    fn key(s: &str) -> KeyPath {
        KeyPath::parse(s)
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let state = state();
        assert_eq!(state.get_option(&key("theme")), Some(json!("system")));
        assert_eq!(state.get_option(&key("a.c")), Some(json!(2)));
        assert_eq!(state.get_option(&key("list.1")), Some(json!(2)));
    }

    #[test]
    fn test_get_missing_path_is_none() {
        let state = state();
        assert_eq!(state.get_option(&key("a.x.y")), None);
        assert_eq!(state.get_option(&key("nope")), None);
    }

    #[test]
    fn test_nested_set_keeps_sibling() {
        let mut state = state();
        assert_eq!(state.set_option(&key("a.b"), json!(5)), SetOutcome::Updated);
        assert_eq!(state.get_option(&key("a.b")), Some(json!(5)));
        assert_eq!(state.get_option(&key("a.c")), Some(json!(2)));
        assert_eq!(state.stored().get("a"), Some(&json!({"b": 5, "c": 2})));
    }

    #[test]
    fn test_set_default_strips_entry() {
        let mut state = state();
        state.set_option(&key("theme"), json!("dark"));
        assert!(state.stored().contains_key("theme"));

        assert_eq!(state.set_option(&key("theme"), json!("system")), SetOutcome::Updated);
        assert!(!state.stored().contains_key("theme"));
        assert_eq!(state.get_option(&key("theme")), Some(json!("system")));
    }

    #[test]
    fn test_nested_set_back_to_default_strips_main_key() {
        let mut state = state();
        state.set_option(&key("a.b"), json!(5));
        state.set_option(&key("a.b"), json!(1));
        assert!(state.stored().is_empty());
    }

    #[test]
    fn test_set_same_value_is_noop() {
        let mut state = state();
        assert_eq!(state.set_option(&key("theme"), json!("system")), SetOutcome::Unchanged);
        assert_eq!(state.pending_changes(), 0);

        state.set_option(&key("theme"), json!("dark"));
        state.take_changes();
        assert_eq!(state.set_option(&key("theme"), json!("dark")), SetOutcome::Unchanged);
        assert_eq!(state.pending_changes(), 0);
    }

    #[test]
    fn test_unknown_key_is_noop() {
        let mut state = state();
        assert_eq!(state.set_option(&key("doesNotExist"), json!(1)), SetOutcome::Unknown);
        assert_eq!(state.set_option(&key("doesNotExist.deep"), json!(1)), SetOutcome::Unknown);
        assert!(state.stored().is_empty());
        assert!(state.take_changes().is_none());
    }

    #[test]
    fn test_changes_keyed_by_full_dotted_key() {
        let mut state = state();
        state.set_option(&key("a.b"), json!(7));
        state.set_option(&key("theme"), json!("dark"));
        state.set_option(&key("a.b"), json!(8));

        let batch = state.take_changes().unwrap();
        let keys: Vec<&str> = batch.keys().collect();
        assert_eq!(keys, vec!["theme", "a.b"]);
        assert_eq!(batch.get("a.b"), Some(&json!(8)));
        assert!(state.take_changes().is_none());
    }

    #[test]
    fn test_returned_default_is_a_copy() {
        let state = state();
        let mut a = state.get_option(&key("a")).unwrap();
        a["b"] = json!(100);
        assert_eq!(state.get_option(&key("a.b")), Some(json!(1)));
        assert_eq!(state.defaults().get("a"), Some(&json!({"b": 1, "c": 2})));
    }

    #[test]
    fn test_merge_strips_defaults_and_requests_write() {
        let mut state = state();
        let mut snapshot = Map::new();
        snapshot.insert("version".to_string(), json!(1));
        snapshot.insert("theme".to_string(), json!("system"));
        snapshot.insert("a".to_string(), json!({"b": 9, "c": 2}));

        let outcome = state.merge_snapshot(snapshot);
        assert!(outcome.needs_write);
        assert!(!outcome.needs_version);
        assert_eq!(state.stored().len(), 1);
        assert_eq!(state.get_option(&key("a.b")), Some(json!(9)));
    }

    #[test]
    fn test_merge_clean_snapshot_needs_no_write() {
        let mut state = state();
        let mut snapshot = Map::new();
        snapshot.insert("theme".to_string(), json!("dark"));

        let outcome = state.merge_snapshot(snapshot);
        assert!(!outcome.needs_write);
        assert!(outcome.needs_version);
    }

    #[test]
    fn test_merge_keeps_unknown_stored_keys() {
        let mut state = state();
        let mut snapshot = Map::new();
        snapshot.insert("fromNewerRelease".to_string(), json!(true));
        state.merge_snapshot(snapshot);

        assert_eq!(state.stored().get("fromNewerRelease"), Some(&json!(true)));
        assert_eq!(state.effective_snapshot().get("fromNewerRelease"), Some(&json!(true)));
    }

    #[test]
    fn test_bootstrap_version_sets_marker() {
        let defaults = Defaults::from_value(json!({"version": 0}));
        let mut state = OptionsState::new(defaults, Migrations::default());
        let outcome = state.merge_snapshot(Map::new());
        assert!(outcome.needs_version);

        assert_eq!(state.bootstrap_version(), SetOutcome::Updated);
        assert_eq!(state.get_option(&key("version")), Some(json!(1)));
        assert_eq!(state.stored().get("version"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_applies_migrations_once() {
        let defaults = Defaults::from_value(json!({"template": "new"}));
        let migrations = Migrations::new(
            vec![MigrationRule {
                key: "template".to_string(),
                legacy: json!("old"),
            }],
            vec![],
        );
        let mut state = OptionsState::new(defaults.clone(), migrations.clone());
        let mut snapshot = Map::new();
        snapshot.insert("template".to_string(), json!("old"));

        let outcome = state.merge_snapshot(snapshot);
        assert!(outcome.needs_write);
        assert!(state.stored().is_empty());
        assert_eq!(state.get_option(&key("template")), Some(json!("new")));

        // Reload what would have been written: nothing left to migrate
        let mut reloaded = OptionsState::new(defaults, migrations);
        let outcome = reloaded.merge_snapshot(state.stored().clone());
        assert!(!outcome.needs_write);
        assert_eq!(reloaded.get_option(&key("template")), Some(json!("new")));
    }

    #[test]
    fn test_array_index_out_of_range_is_rejected() {
        let mut state = state();
        let outcome = state.set_option(&key("list.18446744073709551615"), json!(2));
        assert_eq!(outcome, SetOutcome::Rejected);
        assert_eq!(state.set_option(&key("list.1000000000000"), json!(2)), SetOutcome::Rejected);
        assert!(state.stored().is_empty());
        assert_eq!(state.pending_changes(), 0);

        assert_eq!(state.set_option(&key("list.3"), json!(4)), SetOutcome::Updated);
        assert_eq!(state.get_option(&key("list")), Some(json!([1, 2, 3, 4])));
    }

    #[test]
    fn test_stored_null_falls_back_to_default() {
        let mut state = state();
        let mut snapshot = Map::new();
        snapshot.insert("theme".to_string(), Value::Null);
        state.merge_snapshot(snapshot);

        assert_eq!(state.get_option(&key("theme")), Some(json!("system")));
        assert_eq!(state.effective_snapshot().get("theme"), Some(&json!("system")));
        // Compared against the default, so setting the default is a no-op
        assert_eq!(state.set_option(&key("theme"), json!("system")), SetOutcome::Unchanged);
    }

    #[test]
    fn test_set_null_reads_back_default() {
        let mut state = state();
        state.set_option(&key("theme"), json!("dark"));
        assert_eq!(state.set_option(&key("theme"), Value::Null), SetOutcome::Updated);
        assert_eq!(state.get_option(&key("theme")), Some(json!("system")));
    }

    #[test]
    fn test_numerically_equal_value_is_default() {
        let defaults = Defaults::from_value(json!({"n": 1, "a": {"b": 2}}));
        let mut state = OptionsState::new(defaults, Migrations::default());

        assert_eq!(state.set_option(&key("n"), json!(1.0)), SetOutcome::Unchanged);
        assert_eq!(state.set_option(&key("a.b"), json!(2.0)), SetOutcome::Unchanged);
        assert!(state.stored().is_empty());

        state.set_option(&key("n"), json!(3));
        assert_eq!(state.set_option(&key("n"), json!(1.0)), SetOutcome::Updated);
        assert!(state.stored().is_empty());

        let mut snapshot = Map::new();
        snapshot.insert("a".to_string(), json!({"b": 2.0}));
        assert!(state.merge_snapshot(snapshot).needs_write);
        assert!(state.stored().is_empty());
    }

    #[test]
    fn test_default_option_ignores_override() {
        let mut state = state();
        state.set_option(&key("a.b"), json!(5));
        assert_eq!(state.default_option(&key("a.b")), Some(json!(1)));
        assert_eq!(state.default_option(&key("a")), Some(json!({"b": 1, "c": 2})));
        assert_eq!(state.default_option(&key("nope")), None);
    }

    #[test]
    fn test_effective_snapshot_overlays_stored() {
        let mut state = state();
        state.set_option(&key("a.c"), json!(3));
        let all = state.effective_snapshot();
        assert_eq!(all.get("a"), Some(&json!({"b": 1, "c": 3})));
        assert_eq!(all.get("theme"), Some(&json!("system")));
        assert_eq!(all.len(), 4);
    }
}
