//! Default option values
//!
//! Defaults are fixed at startup and shared read-only between the store, the
//! CLI and any replicas. Anything handed out from here is a copy.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::migration::{MigrationRule, Migrations};

/// Builtin manifest, compiled in
pub const BUILTIN_MANIFEST: &str = include_str!("../defaults/builtin.yml");

/// Immutable mapping from top-level option name to its default value
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    values: Arc<Map<String, Value>>,
}

impl Defaults {
    pub fn new(values: Map<String, Value>) -> Self {
        debug!(count = values.len(), "Defaults::new: called");
        Self {
            values: Arc::new(values),
        }
    }

    /// Build from a JSON object; anything else yields empty defaults
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::new(Map::new()),
        }
    }

    /// Whether `key` is a known top-level option
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Borrow the shared default for a main key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deep copy of the default for a main key
    pub fn copy_of(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Defaults plus the upgrade rules that travel with them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsManifest {
    pub defaults: Map<String, Value>,

    #[serde(default)]
    pub migrations: Vec<MigrationRule>,

    /// Stored keys removed on load
    #[serde(default)]
    pub obsolete: Vec<String>,
}

impl DefaultsManifest {
    /// The manifest compiled into the binary
    pub fn builtin() -> Result<Self> {
        debug!("DefaultsManifest::builtin: called");
        serde_yaml::from_str(BUILTIN_MANIFEST).context("Failed to parse builtin defaults manifest")
    }

    /// Load a manifest from YAML or JSON
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read defaults manifest")?;
        let manifest: Self = serde_yaml::from_str(&content).context("Failed to parse defaults manifest")?;
        info!(
            path = %path.as_ref().display(),
            defaults = manifest.defaults.len(),
            migrations = manifest.migrations.len(),
            "Loaded defaults manifest"
        );
        Ok(manifest)
    }

    /// Use the given file if any, else the builtin manifest
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path)
                .context(format!("Failed to load defaults from {}", path.display())),
            None => Self::builtin(),
        }
    }

    /// Split into the immutable defaults and the migration set
    pub fn into_parts(self) -> (Defaults, Migrations) {
        (
            Defaults::new(self.defaults),
            Migrations::new(self.migrations, self.obsolete),
        )
    }
}
