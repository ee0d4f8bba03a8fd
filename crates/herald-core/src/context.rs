//! Shared handler context.
//!
//! [`Context`] is a string-keyed map of shared resources (a database session,
//! a mailer, an audit store) that every handler on a bus can read and mutate.
//! Values are stored as `Arc<T>` so trait objects work as well as concrete
//! types:
//!
//! ```rust,ignore
//! let ctx = Context::new();
//! ctx.insert("event_log", Arc::new(InMemoryEventLog::new()) as Arc<dyn EventLogStore>);
//!
//! let store: Arc<dyn EventLogStore> = ctx.require("event_log")?;
//! ```
//!
//! Entries inserted with [`Context::insert_scoped`] live only until the next
//! [`Context::release_scoped`] call, which the async bus makes after each
//! concurrent event cohort.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ContextError;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    scoped: bool,
}

/// The context shared by all handlers of one bus.
///
/// All methods take `&self`; the map sits behind a read-write lock so the
/// context can be shared as `Arc<Context>` across concurrent handlers.
#[derive(Default)]
pub struct Context {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a shared value, replacing any previous entry under `key`.
    ///
    /// Returns `true` if an entry was replaced.
    pub fn insert<T>(&self, key: impl Into<String>, value: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.put(key.into(), value, false)
    }

    /// Inserts an owned value, wrapping it in an `Arc`.
    pub fn insert_value<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.put(key.into(), Arc::new(value), false)
    }

    /// Inserts a call-scoped value, dropped by the next [`release_scoped`](Self::release_scoped).
    pub fn insert_scoped<T>(&self, key: impl Into<String>, value: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.put(key.into(), value, true)
    }

    fn put<T>(&self, key: String, value: Arc<T>, scoped: bool) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = Entry {
            value: Arc::new(value),
            type_name: type_name::<T>(),
            scoped,
        };
        let previous = self.entries.write().insert(key, entry);
        previous.is_some()
    }

    /// Returns the value under `key` if present and of type `T`.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        entries
            .get(key)
            .and_then(|entry| entry.value.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Like [`get`](Self::get), but reports why the lookup failed.
    pub fn require<T>(&self, key: &str) -> Result<Arc<T>, ContextError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        let entry = entries
            .get(key)
            .ok_or_else(|| ContextError::Missing(key.to_string()))?;

        entry
            .value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| ContextError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
                actual: entry.type_name,
            })
    }

    /// Removes the entry under `key`. Returns `true` if one existed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key);
        removed.is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every call-scoped entry and returns their keys, sorted.
    pub fn release_scoped(&self) -> Vec<String> {
        let released: Vec<(String, Entry)> = {
            let mut entries = self.entries.write();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.scoped)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove_entry(&key))
                .collect()
        };

        // Values drop here, outside the lock.
        let mut keys: Vec<String> = released.into_iter().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Session: Send + Sync {
        fn id(&self) -> u32;
    }

    struct FakeSession(u32);

    impl Session for FakeSession {
        fn id(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn stores_and_returns_trait_objects() {
        let ctx = Context::new();
        ctx.insert("db_session", Arc::new(FakeSession(7)) as Arc<dyn Session>);

        let session: Arc<dyn Session> = ctx.require("db_session").unwrap();
        assert_eq!(session.id(), 7);
        assert!(ctx.get::<FakeSession>("db_session").is_none());
    }

    #[test]
    fn require_reports_missing_and_mismatched_entries() {
        let ctx = Context::new();
        ctx.insert_value("count", 3_u32);

        assert_eq!(
            ctx.require::<u32>("absent").unwrap_err(),
            ContextError::Missing("absent".into())
        );
        assert!(matches!(
            ctx.require::<String>("count").unwrap_err(),
            ContextError::TypeMismatch { ref key, actual: "u32", .. } if key == "count"
        ));
        assert_eq!(*ctx.require::<u32>("count").unwrap(), 3);
    }

    #[test]
    fn insert_replaces_and_remove_deletes() {
        let ctx = Context::new();
        assert!(!ctx.insert_value("name", "a".to_string()));
        assert!(ctx.insert_value("name", "b".to_string()));
        assert_eq!(*ctx.get::<String>("name").unwrap(), "b");

        assert!(ctx.remove("name"));
        assert!(!ctx.remove("name"));
        assert!(ctx.is_empty());
    }

    #[test]
    fn release_scoped_keeps_long_lived_entries() {
        let ctx = Context::new();
        ctx.insert_value("config", 1_u8);
        ctx.insert_scoped("session_b", Arc::new(2_u8));
        ctx.insert_scoped("session_a", Arc::new(3_u8));

        assert_eq!(ctx.release_scoped(), vec!["session_a", "session_b"]);
        assert_eq!(ctx.keys(), vec!["config"]);
        assert!(ctx.release_scoped().is_empty());
    }

    #[test]
    fn released_values_are_dropped() {
        let ctx = Context::new();
        let session = Arc::new(FakeSession(1));
        ctx.insert_scoped("db_session", Arc::clone(&session));
        assert_eq!(Arc::strong_count(&session), 2);

        ctx.release_scoped();
        assert_eq!(Arc::strong_count(&session), 1);
    }
}
