//! Per-call arguments.
//!
//! An [`Extra`] travels with one `handle_with` call and reaches every
//! handler invoked during it, including the handlers of messages emitted
//! along the way. Keys are free-form; each handler reads the ones it knows
//! and ignores the rest.
//!
//! ```rust,ignore
//! let extra = Extra::new()
//!     .with("user_id", "u1")
//!     .with("meta", json!({ "ip": "10.0.0.1" }));
//!
//! bus.handle_with(Message::event(FolderCreated { id, user_id }), extra)?;
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied values shared by all handlers of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extra {
    values: BTreeMap<String, Value>,
}

impl Extra {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, replacing any previous one under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value and returns the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// The value under `key`. `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    /// The value under `key` as text. Strings are returned as-is, other
    /// values in their JSON form.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Extra
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_values_read_as_absent() {
        let extra = Extra::new().with("user_id", "u1").with("object_id", Value::Null);

        assert_eq!(extra.get_string("user_id").as_deref(), Some("u1"));
        assert!(extra.get("object_id").is_none());
        assert!(!extra.contains("object_id"));
        assert_eq!(extra.len(), 2);
    }

    #[test]
    fn non_string_values_render_as_json() {
        let extra: Extra = [("count", json!(3)), ("meta", json!({ "ip": "10.0.0.1" }))]
            .into_iter()
            .collect();

        assert_eq!(extra.get_string("count").as_deref(), Some("3"));
        assert_eq!(extra.get("meta").unwrap()["ip"], "10.0.0.1");
        assert_eq!(extra.keys().collect::<Vec<_>>(), vec!["count", "meta"]);
    }
}
