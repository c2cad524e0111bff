//! Cache snapshot persistence
//!
//! The metadata store hands a [`Snapshot`] of its entries and completeness
//! table to a [`SnapshotStore`] on save, and hydrates from one on load.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entry::{Completeness, MetadataEntry};
use crate::error::PersistError;

/// Snapshot format version for future compatibility
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of a metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub entries: Vec<MetadataEntry>,
    pub complete: BTreeMap<String, Completeness>,
}

impl Snapshot {
    pub fn new(entries: Vec<MetadataEntry>, complete: BTreeMap<String, Completeness>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries,
            complete,
        }
    }

    fn check_version(self) -> Result<Self, PersistError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::Version {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(self)
    }
}

/// Where cache snapshots are kept
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;

    /// Load the last saved snapshot; None if nothing was saved yet
    fn load(&self) -> Result<Option<Snapshot>, PersistError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        (**self).save(snapshot)
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        (**self).load()
    }
}

/// Discards snapshots; the cache lives only in memory
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSnapshotStore;

impl SnapshotStore for NoopSnapshotStore {
    fn save(&self, _snapshot: &Snapshot) -> Result<(), PersistError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        Ok(None)
    }
}

/// Keeps the last snapshot in process memory
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: Mutex<u64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved snapshot
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of saves so far
    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        self.snapshot().map(Snapshot::check_version).transpose()
    }
}

/// Stores snapshots as a JSON file on local disk
pub struct JsonFileStore {
    /// Snapshot file location
    path: PathBuf,
    /// Serializes concurrent saves to the same file
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Write atomically using tempfile
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut tmp, snapshot)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| PersistError::Io(e.error))?;

        debug!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "Saved cache snapshot"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        snapshot.check_version().map(Some)
    }
}
