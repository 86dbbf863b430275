//! Persistable State
//!
//! A single capability for "save my state into a blob / load it back",
//! implemented by every stateful service that takes part in determinism
//! checks, plus a name-keyed registry that snapshots and restores them
//! together.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

/// Opaque, text-serializable state blob.
pub type StateBlob = serde_json::Value;

/// Errors raised while saving or loading state.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Blob does not match the expected shape.
    #[error("malformed state blob for '{key}': {source}")]
    Malformed {
        /// Registry key of the object being restored.
        key: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Blob decoded but carries values the object rejects.
    #[error("invalid state for '{key}': {reason}")]
    Invalid {
        /// Registry key of the object being restored.
        key: String,
        /// Human readable reason.
        reason: String,
    },

    /// Snapshot names an object that is not registered.
    #[error("no persistable registered under '{0}'")]
    UnknownKey(String),
}

/// Capability of an object whose state can be captured and restored.
pub trait Persistable {
    /// Stable key identifying this object inside a registry snapshot.
    fn persist_key(&self) -> &str;

    /// Capture the full state.
    fn save_state(&self) -> StateBlob;

    /// Replace the full state with a previously captured blob.
    fn load_state(&mut self, blob: &StateBlob) -> Result<(), PersistError>;
}

/// Encode a serde value as a blob.
///
/// Serializing plain data structs into a `Value` cannot fail short of a
/// non-string map key, which none of the state types use.
pub fn encode_blob<T: Serialize>(value: &T) -> StateBlob {
    serde_json::to_value(value).unwrap_or(StateBlob::Null)
}

/// Decode a blob into a serde value, tagging errors with `key`.
pub fn decode_blob<T: DeserializeOwned>(key: &str, blob: &StateBlob) -> Result<T, PersistError> {
    T::deserialize(blob).map_err(|source| PersistError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Shared handle to a registered object.
pub type SharedPersistable = Rc<RefCell<dyn Persistable>>;

/// Name → implementation map for coordinated snapshot/restore.
#[derive(Default)]
pub struct PersistRegistry {
    entries: BTreeMap<String, SharedPersistable>,
}

impl PersistRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under its own `persist_key`.
    ///
    /// Re-registering a key replaces the previous entry.
    pub fn register(&mut self, object: SharedPersistable) {
        let key = object.borrow().persist_key().to_string();
        debug!("Registered persistable '{}'", key);
        self.entries.insert(key, object);
    }

    /// Remove an entry. Returns true if it existed.
    pub fn unregister(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Capture every registered object.
    pub fn snapshot_all(&self) -> BTreeMap<String, StateBlob> {
        self.entries
            .iter()
            .map(|(key, object)| (key.clone(), object.borrow().save_state()))
            .collect()
    }

    /// Restore every object named in `snapshot`.
    ///
    /// Keys absent from the snapshot leave their object untouched.
    /// An unknown key fails before anything is restored.
    pub fn restore_all(&self, snapshot: &BTreeMap<String, StateBlob>) -> Result<(), PersistError> {
        if let Some(unknown) = snapshot.keys().find(|k| !self.entries.contains_key(*k)) {
            return Err(PersistError::UnknownKey(unknown.clone()));
        }

        for (key, blob) in snapshot {
            if let Some(object) = self.entries.get(key) {
                object.borrow_mut().load_state(blob)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    impl Persistable for Counter {
        fn persist_key(&self) -> &str {
            "counter"
        }

        fn save_state(&self) -> StateBlob {
            encode_blob(self)
        }

        fn load_state(&mut self, blob: &StateBlob) -> Result<(), PersistError> {
            *self = decode_blob(self.persist_key(), blob)?;
            Ok(())
        }
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let counter = Rc::new(RefCell::new(Counter { value: 7 }));
        let mut registry = PersistRegistry::new();
        registry.register(counter.clone());

        let snapshot = registry.snapshot_all();
        counter.borrow_mut().value = 99;

        registry.restore_all(&snapshot).unwrap();
        assert_eq!(counter.borrow().value, 7);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let registry = PersistRegistry::new();
        let mut snapshot = BTreeMap::new();
        snapshot.insert("ghost".to_string(), StateBlob::Null);

        assert!(matches!(
            registry.restore_all(&snapshot),
            Err(PersistError::UnknownKey(k)) if k == "ghost"
        ));
    }

    #[test]
    fn test_malformed_blob_reports_key() {
        let counter = Rc::new(RefCell::new(Counter { value: 1 }));
        let mut registry = PersistRegistry::new();
        registry.register(counter.clone());

        let mut snapshot = BTreeMap::new();
        snapshot.insert("counter".to_string(), serde_json::json!({ "value": "nope" }));

        let err = registry.restore_all(&snapshot).unwrap_err();
        assert!(err.to_string().contains("counter"));
        assert_eq!(counter.borrow().value, 1);
    }
}
