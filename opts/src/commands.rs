//! Remote command surface
//!
//! The two commands another context may send: read every effective option, or
//! apply one or more sets followed by a single hook flush.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keypath::KeyPath;

/// One `{key, value, reply?}` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOptionsEntry {
    pub key: KeyPath,

    #[serde(default)]
    pub value: Value,

    /// Skip the debounced flush for this entry; the command flushes at the end
    #[serde(default)]
    pub reply: bool,
}

impl SetOptionsEntry {
    pub fn new(key: impl Into<KeyPath>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            reply: false,
        }
    }
}

/// A single entry or an ordered list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetOptionsRequest {
    One(SetOptionsEntry),
    Many(Vec<SetOptionsEntry>),
}

impl SetOptionsRequest {
    pub fn into_entries(self) -> Vec<SetOptionsEntry> {
        match self {
            SetOptionsRequest::One(entry) => vec![entry],
            SetOptionsRequest::Many(entries) => entries,
        }
    }
}

impl From<SetOptionsEntry> for SetOptionsRequest {
    fn from(entry: SetOptionsEntry) -> Self {
        SetOptionsRequest::One(entry)
    }
}

impl From<Vec<SetOptionsEntry>> for SetOptionsRequest {
    fn from(entries: Vec<SetOptionsEntry>) -> Self {
        SetOptionsRequest::Many(entries)
    }
}

/// Commands accepted from remote callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum OptionsCommand {
    GetAllOptions,
    SetOptions(SetOptionsRequest),
}

impl OptionsCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OptionsCommand::GetAllOptions => "GetAllOptions",
            OptionsCommand::SetOptions(_) => "SetOptions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_entry_parses() {
        let cmd: OptionsCommand =
            serde_json::from_str(r#"{"cmd":"SetOptions","data":{"key":"editor.tabSize","value":4}}"#).unwrap();
        let OptionsCommand::SetOptions(request) = cmd else {
            panic!("expected SetOptions");
        };
        let entries = request.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, KeyPath::parse("editor.tabSize"));
        assert_eq!(entries[0].value, json!(4));
        assert!(!entries[0].reply);
    }

    #[test]
    fn test_entry_list_keeps_order() {
        let json = r#"{"cmd":"SetOptions","data":[
            {"key":"b","value":1,"reply":true},
            {"key":"a","value":2}
        ]}"#;
        let cmd: OptionsCommand = serde_json::from_str(json).unwrap();
        let OptionsCommand::SetOptions(request) = cmd else {
            panic!("expected SetOptions");
        };
        let entries = request.into_entries();
        assert_eq!(entries[0].key.dotted(), "b");
        assert!(entries[0].reply);
        assert_eq!(entries[1].key.dotted(), "a");
    }

    #[test]
    fn test_missing_value_is_null() {
        let entry: SetOptionsEntry = serde_json::from_str(r#"{"key":"x"}"#).unwrap();
        assert_eq!(entry.value, Value::Null);
    }

    #[test]
    fn test_get_all_options_parses() {
        let cmd: OptionsCommand = serde_json::from_str(r#"{"cmd":"GetAllOptions"}"#).unwrap();
        assert_eq!(cmd, OptionsCommand::GetAllOptions);
        assert_eq!(cmd.name(), "GetAllOptions");
    }
}
