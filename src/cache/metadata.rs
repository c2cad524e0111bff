//! Metadata Store Implementation
//!
//! Concurrent in-memory store of cache slots keyed by normalized path, plus a
//! per-directory completeness table. Uses synchronous Moka caches with no TTL
//! and no capacity bound: entries only leave through invalidation.
//!
//! Check-then-act sequences (merge on update, prefix purge) are not atomic
//! with respect to concurrent writers of the same key. Callers that need
//! per-path linearizability must serialize access to that path themselves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use moka::sync::Cache;
use tracing::{debug, info, trace, warn};

use super::entry::{Completeness, Lookup, MetadataEntry, Update};
use super::snapshot::{NoopSnapshotStore, Snapshot, SnapshotStore};
use crate::backend::FileMetadata;
use crate::error::PersistError;
use crate::path::{dirname, is_within, rebase};

/// Store behaviour settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Save after every mutation
    pub autosave: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { autosave: true }
    }
}

/// Metadata store with negative caching and listing completeness
pub struct MetadataStore {
    /// Cache slots by path
    entries: Cache<String, MetadataEntry>,
    /// Listing completeness by directory path
    complete: Cache<String, Completeness>,
    /// Snapshot persistence
    persistence: Box<dyn SnapshotStore>,
    autosave: AtomicBool,
    /// Set once the final save has run
    closed: AtomicBool,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MetadataStore {
    /// Create an in-memory store that autosaves to nowhere
    pub fn new() -> Self {
        Self::with_store(NoopSnapshotStore, StoreConfig::default())
    }

    /// Create a store persisting through `persistence`
    pub fn with_store(persistence: impl SnapshotStore + 'static, config: StoreConfig) -> Self {
        let entries = Cache::builder().name("metadata_entries").build();
        let complete = Cache::builder().name("listing_completeness").build();

        Self {
            entries,
            complete,
            persistence: Box::new(persistence),
            autosave: AtomicBool::new(config.autosave),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_autosave(&self) -> bool {
        self.autosave.load(Ordering::Relaxed)
    }

    pub fn set_autosave(&self, autosave: bool) {
        self.autosave.store(autosave, Ordering::Relaxed);
    }

    /// Whether a live (non-negative) entry exists for `path`
    pub fn has(&self, path: &str) -> bool {
        self.entries.get(path).is_some_and(|entry| entry.is_live())
    }

    /// Raw slot for `path`, negative entries included
    pub fn get(&self, path: &str) -> Option<MetadataEntry> {
        self.entries.get(path)
    }

    /// Tri-state lookup
    ///
    /// Hits and negative hits count as cache hits.
    pub fn lookup(&self, path: &str) -> Lookup<MetadataEntry> {
        match self.entries.get(path) {
            Some(entry) if entry.is_live() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache HIT");
                Lookup::Hit(entry)
            }
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache HIT (negative)");
                Lookup::Miss
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache MISS");
                Lookup::Absent
            }
        }
    }

    /// Merge an attribute into the slot for `path` without saving
    fn upsert(&self, path: &str, update: Update) {
        let current = self
            .entries
            .get(path)
            .unwrap_or_else(|| MetadataEntry::missing(path));
        self.entries.insert(path.to_string(), current.apply(update));
    }

    /// Upsert an attribute for `path`; autosave if `persist`
    pub fn update(&self, path: &str, update: Update, persist: bool) -> Result<(), PersistError> {
        debug!(path = path, update = ?update_kind(&update), "Cached object");
        self.upsert(path, update);
        if persist {
            self.autosave()?;
        }
        Ok(())
    }

    /// Record that `path` does not exist
    pub fn store_miss(&self, path: &str) -> Result<(), PersistError> {
        self.entries
            .insert(path.to_string(), MetadataEntry::missing(path));
        debug!(path = path, "Cached miss");
        self.autosave()
    }

    /// Mark every missing or unknown ancestor of `path` as a directory
    pub fn ensure_parent_directories(&self, path: &str) {
        let mut parent = dirname(path);
        while !parent.is_empty() {
            if !self.has(parent) {
                self.upsert(parent, Update::Directory);
            }
            parent = dirname(parent);
        }
    }

    pub fn completeness(&self, dirname: &str) -> Completeness {
        self.complete.get(dirname).unwrap_or(Completeness::Absent)
    }

    /// Whether the cache holds a full listing of `dirname` at the requested depth
    pub fn is_complete(&self, dirname: &str, recursive: bool) -> bool {
        self.completeness(dirname).satisfies(recursive)
    }

    /// Mark a directory as completely listed
    pub fn set_complete(&self, dirname: &str, recursive: bool) {
        let state = if recursive {
            Completeness::Recursive
        } else {
            Completeness::Shallow
        };
        self.complete.insert(dirname.to_string(), state);
    }

    /// Hydrate the store from a backend listing of `directory`
    ///
    /// Saves once for the whole batch.
    pub fn store_contents(
        &self,
        directory: &str,
        contents: &[FileMetadata],
        recursive: bool,
    ) -> Result<(), PersistError> {
        for metadata in contents {
            self.upsert(&metadata.path, Update::Metadata(metadata.clone()));
        }
        self.set_complete(directory, recursive);

        debug!(
            directory = directory,
            recursive = recursive,
            entries = contents.len(),
            "Cached directory listing"
        );
        self.autosave()
    }

    /// Listing of `directory` derived from cached entries, sorted by path
    pub fn list_contents(&self, directory: &str, recursive: bool) -> Vec<FileMetadata> {
        let mut listing: Vec<FileMetadata> = self
            .entries
            .iter()
            .filter(|(path, entry)| {
                entry.is_live()
                    && is_within(path.as_str(), directory)
                    && (recursive || dirname(path.as_str()) == directory)
            })
            .map(|(_, entry)| entry.metadata)
            .collect();
        listing.sort_by(|a, b| a.path.cmp(&b.path));
        listing
    }

    /// Move the entry at `from` to `to`
    ///
    /// Cached descendants of `from` and their listing state move along,
    /// whether or not `from` itself is cached. The backend has confirmed `to`
    /// exists, so it always ends up with a live entry.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), PersistError> {
        let entry = self.entries.get(from).filter(|entry| entry.is_live());
        let moved = self.move_descendants(from, to);
        self.entries.invalidate(from);

        let target = match entry {
            Some(entry) => entry.moved_to(to),
            None if moved > 0 => MetadataEntry::missing(to).apply(Update::Directory),
            None => MetadataEntry::missing(to).apply(Update::Exists),
        };
        self.entries.insert(to.to_string(), target);

        debug!(from = from, to = to, descendants = moved, "Renamed cached object");
        self.autosave()
    }

    /// Rebase every entry and tracker below `from` onto `to`
    ///
    /// Negative entries below `from` are dropped. Returns how many live
    /// entries and trackers were moved.
    fn move_descendants(&self, from: &str, to: &str) -> usize {
        let mut moved = 0;

        let descendants: Vec<(String, MetadataEntry)> = self
            .entries
            .iter()
            .filter(|(path, _)| is_within(path.as_str(), from))
            .map(|(path, entry)| (path.to_string(), entry))
            .collect();
        for (path, entry) in descendants {
            self.entries.invalidate(&path);
            if let Some(target) = rebase(&path, from, to) {
                if entry.is_live() {
                    self.entries.insert(target.clone(), entry.moved_to(&target));
                    moved += 1;
                }
            }
        }

        for (dir, state) in self.trackers_under(from) {
            self.complete.invalidate(&dir);
            if let Some(target) = rebase(&dir, from, to) {
                self.complete.insert(target, state);
                moved += 1;
            }
        }
        moved
    }

    /// Copy the entry at `from` to `to`
    ///
    /// Without a live source entry the copy is only known to exist.
    pub fn copy(&self, from: &str, to: &str) -> Result<(), PersistError> {
        let copied = match self.entries.get(from) {
            Some(entry) if entry.is_live() => {
                let mut copied = entry.moved_to(to);
                copied.metadata.timestamp = None;
                copied
            }
            _ => MetadataEntry::missing(to).apply(Update::Exists),
        };
        self.entries.insert(to.to_string(), copied);

        debug!(from = from, to = to, "Copied cached object");
        self.autosave()
    }

    /// Record a deletion as a negative entry
    pub fn delete(&self, path: &str) -> Result<(), PersistError> {
        self.store_miss(path)
    }

    /// Forget `dirname`, everything below it, and its listing state
    pub fn delete_dir(&self, dirname: &str) -> Result<(), PersistError> {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(path, _)| path.as_str() == dirname || is_within(path.as_str(), dirname))
            .map(|(path, _)| path.to_string())
            .collect();
        for path in &doomed {
            self.entries.invalidate(path);
        }

        for (dir, _) in self.trackers_under(dirname) {
            self.complete.invalidate(&dir);
        }

        debug!(dirname = dirname, purged = doomed.len(), "Purged cached directory");
        self.autosave()
    }

    /// Completeness trackers for `dirname` and every directory below it
    fn trackers_under(&self, dirname: &str) -> Vec<(String, Completeness)> {
        self.complete
            .iter()
            .filter(|(dir, _)| dir.as_str() == dirname || is_within(dir.as_str(), dirname))
            .map(|(dir, state)| (dir.to_string(), state))
            .collect()
    }

    fn clear(&self) {
        self.entries.invalidate_all();
        self.complete.invalidate_all();
    }

    /// Clear all entries and listing state
    pub fn flush(&self) -> Result<(), PersistError> {
        self.clear();
        info!("Flushed metadata cache");
        self.autosave()
    }

    /// Save if the store is configured to autosave
    pub fn autosave(&self) -> Result<(), PersistError> {
        if self.is_autosave() {
            self.save()?;
        }
        Ok(())
    }

    /// Current contents as a snapshot, entries sorted by path
    pub fn snapshot(&self) -> Snapshot {
        let mut entries: Vec<MetadataEntry> = self.entries.iter().map(|(_, entry)| entry).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let complete: BTreeMap<String, Completeness> = self
            .complete
            .iter()
            .map(|(dir, state)| (dir.to_string(), state))
            .collect();
        Snapshot::new(entries, complete)
    }

    /// Persist the store through its snapshot store
    pub fn save(&self) -> Result<(), PersistError> {
        let snapshot = self.snapshot();
        self.persistence.save(&snapshot)?;
        trace!(entries = snapshot.entries.len(), "Saved metadata cache");
        Ok(())
    }

    /// Replace the store contents with the last saved snapshot
    ///
    /// Leaves the store untouched when no snapshot exists.
    pub fn load(&self) -> Result<(), PersistError> {
        let snapshot = match self.persistence.load()? {
            Some(snapshot) => snapshot,
            None => {
                debug!("No cache snapshot to load");
                return Ok(());
            }
        };

        self.clear();
        for entry in &snapshot.entries {
            self.entries.insert(entry.path.clone(), entry.clone());
        }
        for (dir, state) in &snapshot.complete {
            if *state != Completeness::Absent {
                self.complete.insert(dir.clone(), *state);
            }
        }

        info!(
            entries = snapshot.entries.len(),
            complete_dirs = snapshot.complete.len(),
            "Loaded metadata cache"
        );
        Ok(())
    }

    /// Final save; runs at most once per store
    pub fn close(&self) -> Result<(), PersistError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.save()
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Number of cached slots, negative entries included
    pub fn entry_count(&self) -> usize {
        self.entries.iter().count()
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();

        info!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.entry_count(),
            complete_dirs = self.complete.iter().count(),
            "Cache metrics"
        );
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        if self.is_autosave() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to save metadata cache on drop");
        }
    }
}

fn update_kind(update: &Update) -> &'static str {
    match update {
        Update::Exists => "exists",
        Update::Contents(_) => "contents",
        Update::Metadata(_) => "metadata",
        Update::Directory => "directory",
        Update::Size(_) => "size",
        Update::Mimetype(_) => "mimetype",
        Update::Timestamp(_) => "timestamp",
        Update::Visibility(_) => "visibility",
    }
}
