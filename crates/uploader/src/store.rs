//! Session persistence.
//!
//! Records of in-flight sessions are kept so a caller can see what was
//! interrupted after a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use bigup_protocol::SessionRecord;
use tracing::debug;

use crate::error::StoreError;

/// Storage for persisted session records.
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces the record of `record.session_id`.
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Removes a record. Removing an unknown id is not an error.
    fn remove(&self, session_id: &str) -> Result<(), StoreError>;

    /// Returns every stored record, ordered by session id.
    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError>;
}

fn sorted(records: &HashMap<String, SessionRecord>) -> Vec<SessionRecord> {
    let mut all: Vec<_> = records.values().cloned().collect();
    all.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    all
}

/// Keeps records in memory only.
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(sorted(
            &self.records.read().unwrap_or_else(PoisonError::into_inner),
        ))
    }
}

/// Records cached in memory and persisted to a JSON file.
pub struct JsonFileSessionStore {
    path: PathBuf,
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl JsonFileSessionStore {
    /// Opens the store, loading existing records from disk.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = load_records(&path)?;
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current records to disk.
    fn persist(&self) -> Result<(), StoreError> {
        let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted {} session record(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

impl SessionStore for JsonFileSessionStore {
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        {
            let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
            map.insert(record.session_id.clone(), record.clone());
        }
        self.persist()
    }

    fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
            map.remove(session_id).is_some()
        };
        if removed { self.persist() } else { Ok(()) }
    }

    fn load_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(sorted(
            &self.records.read().unwrap_or_else(PoisonError::into_inner),
        ))
    }
}

/// Loads records from a JSON file, returning an empty map if missing.
fn load_records(path: &Path) -> Result<HashMap<String, SessionRecord>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&data)?)
}
