//! One-time upgrades applied to the persisted snapshot on load

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::defaults::Defaults;
use crate::object::deep_equal;

/// Top-level key holding the storage format version
pub const VERSION_KEY: &str = "version";

/// Value written when no version marker is present
pub const INITIAL_VERSION: u64 = 1;

/// Replace a stored value that still equals an old default
///
/// When a default changes between releases, users who never touched the
/// option still have the old default persisted. Swapping it for the current
/// default lets the load-time strip pass drop it from storage, so the rule
/// stops matching on later loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRule {
    pub key: String,
    pub legacy: Value,
}

/// The rule set carried by a defaults manifest
#[derive(Debug, Clone, Default)]
pub struct Migrations {
    rules: Vec<MigrationRule>,
    obsolete: Vec<String>,
}

impl Migrations {
    pub fn new(rules: Vec<MigrationRule>, obsolete: Vec<String>) -> Self {
        Self { rules, obsolete }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.obsolete.is_empty()
    }

    /// Apply every rule to `options`, returning whether anything changed
    pub fn apply(&self, options: &mut Map<String, Value>, defaults: &Defaults) -> bool {
        debug!(rules = self.rules.len(), obsolete = self.obsolete.len(), "Migrations::apply: called");
        let mut changed = false;

        for rule in &self.rules {
            let Some(current_default) = defaults.get(&rule.key) else {
                debug!(key = %rule.key, "Migrations::apply: rule names unknown option, skipping");
                continue;
            };
            if let Some(stored) = options.get_mut(&rule.key)
                && deep_equal(stored, &rule.legacy)
            {
                info!(key = %rule.key, "Migrating legacy default to current default");
                *stored = current_default.clone();
                changed = true;
            }
        }

        for key in &self.obsolete {
            if options.remove(key).is_some() {
                info!(%key, "Removed obsolete option");
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> (Defaults, Migrations) {
        let defaults = Defaults::from_value(json!({"template": "new", "other": 1}));
        let migrations = Migrations::new(
            vec![MigrationRule {
                key: "template".to_string(),
                legacy: json!("old"),
            }],
            vec!["stale".to_string()],
        );
        (defaults, migrations)
    }

    #[test]
    fn test_legacy_value_replaced() {
        let (defaults, migrations) = fixture();
        let mut options = Map::new();
        options.insert("template".to_string(), json!("old"));

        assert!(migrations.apply(&mut options, &defaults));
        assert_eq!(options.get("template"), Some(&json!("new")));
    }

    #[test]
    fn test_legacy_number_matches_across_representations() {
        let defaults = Defaults::from_value(json!({"width": 320}));
        let migrations = Migrations::new(
            vec![MigrationRule {
                key: "width".to_string(),
                legacy: json!(300),
            }],
            vec![],
        );
        let mut options = Map::new();
        options.insert("width".to_string(), json!(300.0));

        assert!(migrations.apply(&mut options, &defaults));
        assert_eq!(options.get("width"), Some(&json!(320)));
    }

    #[test]
    fn test_customized_value_untouched() {
        let (defaults, migrations) = fixture();
        let mut options = Map::new();
        options.insert("template".to_string(), json!("mine"));

        assert!(!migrations.apply(&mut options, &defaults));
        assert_eq!(options.get("template"), Some(&json!("mine")));
    }

    #[test]
    fn test_obsolete_key_removed() {
        let (defaults, migrations) = fixture();
        let mut options = Map::new();
        options.insert("stale".to_string(), json!(true));

        assert!(migrations.apply(&mut options, &defaults));
        assert!(options.is_empty());
    }

    #[test]
    fn test_rule_for_unknown_default_is_ignored() {
        let defaults = Defaults::from_value(json!({}));
        let migrations = Migrations::new(
            vec![MigrationRule {
                key: "gone".to_string(),
                legacy: json!(1),
            }],
            vec![],
        );
        let mut options = Map::new();
        options.insert("gone".to_string(), json!(1));

        assert!(!migrations.apply(&mut options, &defaults));
        assert_eq!(options.get("gone"), Some(&json!(1)));
    }
}
