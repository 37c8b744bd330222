//! Keypaths and Change Maps
//!
//! A keypath is a concrete, dot-separated path into observed state, such as
//! `items.3.name`. A change map is what a viewmodel reports after applying
//! its pending mutations: the keypaths that changed, in the order they were
//! changed, each with its new value.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A concrete path into observed state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keypath(String);

impl Keypath {
    /// Create a keypath from its textual form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Keypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Keypath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for Keypath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Changed keypaths and their new values, in change order.
pub type ChangeMap = IndexMap<Keypath, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_map_keeps_change_order() {
        let mut changes = ChangeMap::new();
        changes.insert("z".into(), json!(1));
        changes.insert("a".into(), json!(2));

        let keys: Vec<_> = changes.keys().map(Keypath::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut changes = ChangeMap::new();
        changes.insert("x".into(), json!(1));
        assert_eq!(serde_json::to_value(&changes).unwrap(), json!({ "x": 1 }));
    }
}
