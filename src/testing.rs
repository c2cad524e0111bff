//! In-memory backend for tests
//!
//! Counts every call so tests can assert when the cache answered on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::backend::{Backend, Config, FileMetadata, Visibility};
use crate::error::{Error, Result};
use crate::path::{dirname, guess_mimetype, is_within, rebase};

struct StoredFile {
    contents: String,
    visibility: Visibility,
    timestamp: i64,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    dirs: BTreeSet<String>,
    clock: i64,
}

impl State {
    fn add_parents(&mut self, path: &str) {
        let mut parent = dirname(path);
        while !parent.is_empty() {
            self.dirs.insert(parent.to_string());
            parent = dirname(parent);
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    /// Error for a file operation on a path that holds no file
    fn no_file(&self, path: &str) -> Error {
        if self.dirs.contains(path) {
            Error::NotAFile(path.to_string())
        } else {
            Error::NotFound(path.to_string())
        }
    }

    fn metadata(&self, path: &str) -> Option<FileMetadata> {
        if let Some(file) = self.files.get(path) {
            let mut metadata = FileMetadata::file(path, file.contents.len() as u64);
            metadata.visibility = Some(file.visibility);
            metadata.timestamp = Some(file.timestamp);
            metadata.mimetype = Some(guess_mimetype(path).to_string());
            return Some(metadata);
        }
        if self.dirs.contains(path) {
            return Some(FileMetadata::directory(path));
        }
        None
    }
}

/// Counting in-memory backend
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    calls: AtomicUsize,
    broken: AtomicBool,
    declining: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without counting a call
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        {
            let mut state = self.lock();
            let timestamp = state.tick();
            state.add_parents(path);
            state.files.insert(
                path.to_string(),
                StoredFile {
                    contents: contents.to_string(),
                    visibility: Visibility::Public,
                    timestamp,
                },
            );
        }
        self
    }

    /// Number of backend calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with an I/O error
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Make every mutation return `Ok(false)`
    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "backend offline")));
        }
        Ok(())
    }

    fn enter_mutation(&self) -> Result<bool> {
        self.enter()?;
        Ok(!self.declining.load(Ordering::SeqCst))
    }

    fn with_metadata<T>(&self, path: &str, f: impl FnOnce(FileMetadata) -> Option<T>) -> Result<T> {
        self.enter()?;
        let state = self.lock();
        let metadata = state.metadata(path).ok_or_else(|| state.no_file(path))?;
        f(metadata).ok_or_else(|| Error::NotAFile(path.to_string()))
    }
}

impl Backend for MemoryBackend {
    fn has(&self, path: &str) -> Result<bool> {
        self.enter()?;
        Ok(self.lock().metadata(path).is_some())
    }

    fn read(&self, path: &str) -> Result<String> {
        self.enter()?;
        let state = self.lock();
        state
            .files
            .get(path)
            .map(|file| file.contents.clone())
            .ok_or_else(|| state.no_file(path))
    }

    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<FileMetadata>> {
        self.enter()?;
        let state = self.lock();
        if !directory.is_empty() && !state.dirs.contains(directory) {
            return Err(Error::DirectoryNotFound(directory.to_string()));
        }
        let paths = state.files.keys().chain(state.dirs.iter());
        let mut listing: Vec<FileMetadata> = paths
            .filter(|path| is_within(path, directory) && (recursive || dirname(path) == directory))
            .filter_map(|path| state.metadata(path))
            .collect();
        listing.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listing)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        self.with_metadata(path, Some)
    }

    fn get_size(&self, path: &str) -> Result<u64> {
        self.with_metadata(path, |m| m.size)
    }

    fn get_mimetype(&self, path: &str) -> Result<String> {
        self.with_metadata(path, |m| m.mimetype)
    }

    fn get_timestamp(&self, path: &str) -> Result<i64> {
        self.with_metadata(path, |m| m.timestamp)
    }

    fn get_visibility(&self, path: &str) -> Result<Visibility> {
        self.with_metadata(path, |m| m.visibility)
    }

    fn write(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        if state.files.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let timestamp = state.tick();
        state.add_parents(path);
        state.files.insert(
            path.to_string(),
            StoredFile {
                contents: contents.to_string(),
                visibility: config.visibility().unwrap_or(Visibility::Public),
                timestamp,
            },
        );
        Ok(true)
    }

    fn update(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        let timestamp = state.tick();
        let file = state
            .files
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        file.contents = contents.to_string();
        file.timestamp = timestamp;
        if let Some(visibility) = config.visibility() {
            file.visibility = visibility;
        }
        Ok(true)
    }

    fn rename(&self, from: &str, to: &str) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        if let Some(file) = state.files.remove(from) {
            state.add_parents(to);
            state.files.insert(to.to_string(), file);
            return Ok(true);
        }
        if !state.dirs.contains(from) {
            return Err(Error::NotFound(from.to_string()));
        }

        let files: Vec<String> = state.files.keys().filter(|p| is_within(p, from)).cloned().collect();
        for path in files {
            if let (Some(file), Some(target)) = (state.files.remove(&path), rebase(&path, from, to)) {
                state.files.insert(target, file);
            }
        }
        let dirs: Vec<String> = state
            .dirs
            .iter()
            .filter(|p| p.as_str() == from || is_within(p, from))
            .cloned()
            .collect();
        for path in dirs {
            state.dirs.remove(&path);
            if let Some(target) = rebase(&path, from, to) {
                state.dirs.insert(target);
            }
        }
        state.add_parents(to);
        Ok(true)
    }

    fn copy(&self, path: &str, newpath: &str) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        let timestamp = state.tick();
        let (contents, visibility) = match state.files.get(path) {
            Some(file) => (file.contents.clone(), file.visibility),
            None => return Err(state.no_file(path)),
        };
        state.add_parents(newpath);
        state.files.insert(
            newpath.to_string(),
            StoredFile {
                contents,
                visibility,
                timestamp,
            },
        );
        Ok(true)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        match state.files.remove(path) {
            Some(_) => Ok(true),
            None => Err(state.no_file(path)),
        }
    }

    fn delete_dir(&self, dirname: &str) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        if !state.dirs.remove(dirname) {
            return Err(Error::DirectoryNotFound(dirname.to_string()));
        }
        state.files.retain(|path, _| !is_within(path, dirname));
        state.dirs.retain(|path| !is_within(path, dirname));
        Ok(true)
    }

    fn create_dir(&self, dirname: &str, _config: &Config) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        state.add_parents(dirname);
        state.dirs.insert(dirname.to_string());
        Ok(true)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        if !self.enter_mutation()? {
            return Ok(false);
        }
        let mut state = self.lock();
        if state.dirs.contains(path) {
            return Ok(true);
        }
        match state.files.get_mut(path) {
            Some(file) => {
                file.visibility = visibility;
                Ok(true)
            }
            None => Err(Error::NotFound(path.to_string())),
        }
    }
}
