//! Last-known state persistence.
//!
//! Restoring is a capability of its own, separate from reading and toggling:
//! entities implement [`RestoreState`], stores implement [`StateStore`], and
//! [`restore_entity`] seeds an entity before its first live read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::StoreError;

/// A persisted entity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    /// State text as reported by [`Entity::state`].
    pub state: String,
    /// When the state was saved.
    pub last_updated: DateTime<Utc>,
}

impl StoredState {
    /// Create a stored state stamped with the current time.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            last_updated: Utc::now(),
        }
    }
}

/// Entities that can be seeded from a stored state.
pub trait RestoreState: Entity {
    /// Seed the cached value from `stored`.
    fn restore_state(&mut self, stored: &StoredState);

    /// The state worth persisting, if any.
    fn stored_state(&self) -> Option<StoredState> {
        self.state().map(StoredState::new)
    }
}

/// Storage for last-known entity states, keyed by entity name.
pub trait StateStore: Send + Sync {
    fn load(&self, entity: &str) -> Option<StoredState>;

    fn save(&self, entity: &str, state: StoredState) -> Result<(), StoreError>;
}

/// Seed `entity` from `store`. Returns whether a stored state was found.
pub fn restore_entity<E, S>(entity: &mut E, store: &S) -> bool
where
    E: RestoreState,
    S: StateStore + ?Sized,
{
    match store.load(entity.name()) {
        Some(stored) => {
            tracing::debug!(entity = %entity.name(), state = %stored.state, "Restoring state");
            entity.restore_state(&stored);
            true
        }
        None => false,
    }
}

/// Save the entity's current state if it differs from the stored one.
///
/// Returns whether anything was written.
pub fn persist_entity<E, S>(entity: &E, store: &S) -> Result<bool, StoreError>
where
    E: RestoreState,
    S: StateStore + ?Sized,
{
    match entity.stored_state() {
        Some(current) => save_if_changed(store, entity.name(), current),
        None => Ok(false),
    }
}

/// Save `state` under `entity` unless the store already holds the same text.
///
/// Returns whether anything was written.
pub fn save_if_changed<S>(store: &S, entity: &str, state: StoredState) -> Result<bool, StoreError>
where
    S: StateStore + ?Sized,
{
    if store
        .load(entity)
        .is_some_and(|previous| previous.state == state.state)
    {
        return Ok(false);
    }

    store.save(entity, state)?;
    Ok(true)
}

/// In-memory store, mainly for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<String, StoredState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, entity: &str) -> Option<StoredState> {
        self.states.read().get(entity).cloned()
    }

    fn save(&self, entity: &str, state: StoredState) -> Result<(), StoreError> {
        self.states.write().insert(entity.to_string(), state);
        Ok(())
    }
}

/// Store backed by a single JSON document.
///
/// The whole document is rewritten on every save, through a temporary file
/// renamed over the original. The in-memory view only changes once the file
/// write succeeded, so a failed save is retried by the next one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    states: RwLock<HashMap<String, StoredState>>,
    writer: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file starts an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let states = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = states.len(), "Opened state store");

        Ok(Self {
            path,
            states: RwLock::new(states),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, states: &HashMap<String, StoredState>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(states)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, entity: &str) -> Option<StoredState> {
        self.states.read().get(entity).cloned()
    }

    fn save(&self, entity: &str, state: StoredState) -> Result<(), StoreError> {
        let _writer = self.writer.lock();

        let mut next = self.states.read().clone();
        next.insert(entity.to_string(), state);
        self.write_file(&next)?;

        *self.states.write() = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.load("pump").is_none());

        store.save("pump", StoredState::new("on")).unwrap();
        assert_eq!(store.load("pump").unwrap().state, "on");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            assert!(store.load("temperature").is_none());
            store
                .save("temperature", StoredState::new("21.5"))
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load("temperature").unwrap().state, "21.5");
    }

    #[test]
    fn test_failed_save_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let path = state_dir.join("state.json");
        let store = JsonFileStore::open(&path).unwrap();

        assert!(matches!(
            save_if_changed(&store, "pump", StoredState::new("on")),
            Err(StoreError::Io(_))
        ));
        assert!(store.load("pump").is_none());

        std::fs::create_dir(&state_dir).unwrap();
        assert!(save_if_changed(&store, "pump", StoredState::new("on")).unwrap());
        assert!(path.exists());
        assert!(!save_if_changed(&store, "pump", StoredState::new("on")).unwrap());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load("pump").unwrap().state, "on");
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_json_file_store_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.load("anything").is_none());
    }
}
