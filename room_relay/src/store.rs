//! Snapshot storage between requests
//!
//! A WASI HTTP host may instantiate the component for every request, so
//! the relay reloads its state at the start of a request and writes it back
//! at the end.

use crate::error::StoreError;
use crate::state::Snapshot;
use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::PathBuf;

pub trait StateStore {
    /// The last saved snapshot, or `None` on first start
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Keeps the serialized snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    json: RefCell<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        match self.json.borrow().as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        *self.json.borrow_mut() = Some(serde_json::to_string(snapshot)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemberId, Room, RoomId};
    use assert_matches::assert_matches;

    fn snapshot() -> Snapshot {
        Snapshot {
            rooms: vec![Room::new(RoomId::from("r1"), MemberId::from("h1"), 7)],
            ..Snapshot::default()
        }
    }

    #[test]
    fn file_store_starts_empty_and_keeps_what_was_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot()));
    }

    #[test]
    fn file_store_reports_corrupt_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_matches!(FileStore::new(path).load(), Err(StoreError::Json(_)));
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot()));
    }
}
