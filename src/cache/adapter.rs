//! Caching backend decorator
//!
//! Wraps any backend and answers reads from the metadata store where it can.
//! Mutations always go to the wrapped backend first and are mirrored into the
//! store only when the backend reports success.

use std::sync::Arc;

use tracing::debug;

use super::entry::Update;
use super::fetch::{self, fetch};
use super::metadata::MetadataStore;
use crate::backend::{Backend, Config, FileMetadata, Visibility};
use crate::error::{Error, PersistError, Result};
use crate::path::normalize_path;

/// Backend that caches metadata (and contents) of another backend
pub struct CachedBackend<B> {
    backend: B,
    store: Arc<MetadataStore>,
}

impl<B: Backend> CachedBackend<B> {
    /// Wrap `backend` with an in-memory store
    pub fn new(backend: B) -> Self {
        Self::with_store(backend, Arc::new(MetadataStore::new()))
    }

    pub fn with_store(backend: B, store: Arc<MetadataStore>) -> Self {
        Self { backend, store }
    }

    /// The metadata store
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// The wrapped backend
    pub fn inner(&self) -> &B {
        &self.backend
    }

    pub fn flush(&self) -> std::result::Result<(), PersistError> {
        self.store.flush()
    }

    pub fn save(&self) -> std::result::Result<(), PersistError> {
        self.store.save()
    }

    pub fn load(&self) -> std::result::Result<(), PersistError> {
        self.store.load()
    }

    pub fn close(&self) -> std::result::Result<(), PersistError> {
        self.store.close()
    }

    fn required<A: fetch::Attribute>(&self, path: &str) -> Result<A::Value> {
        let path = normalize_path(path);
        fetch::<A, B>(&self.store, &self.backend, &path)?.ok_or(Error::NotFound(path))
    }

    /// Mirror a successful write of `contents` into the store, saving once
    fn cache_contents(&self, path: &str, contents: &str, config: &Config) -> Result<()> {
        self.store.ensure_parent_directories(path);
        self.store
            .update(path, Update::Contents(contents.to_string()), false)?;
        if let Some(visibility) = config.visibility() {
            self.store.update(path, Update::Visibility(visibility), false)?;
        }
        self.store.autosave()?;
        Ok(())
    }
}

impl<B: Backend> Backend for CachedBackend<B> {
    fn has(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path);
        Ok(fetch::<fetch::Exists, B>(&self.store, &self.backend, &path)?.unwrap_or(false))
    }

    fn read(&self, path: &str) -> Result<String> {
        self.required::<fetch::Contents>(path)
    }

    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<FileMetadata>> {
        let directory = normalize_path(directory);
        if self.store.is_complete(&directory, recursive) {
            debug!(directory = %directory, "Listing served from cache");
            return Ok(self.store.list_contents(&directory, recursive));
        }

        let contents = self.backend.list_contents(&directory, recursive)?;
        self.store.store_contents(&directory, &contents, recursive)?;
        Ok(contents)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        self.required::<fetch::Metadata>(path)
    }

    fn get_size(&self, path: &str) -> Result<u64> {
        self.required::<fetch::Size>(path)
    }

    fn get_mimetype(&self, path: &str) -> Result<String> {
        self.required::<fetch::Mimetype>(path)
    }

    fn get_timestamp(&self, path: &str) -> Result<i64> {
        self.required::<fetch::Timestamp>(path)
    }

    fn get_visibility(&self, path: &str) -> Result<Visibility> {
        self.required::<fetch::VisibilityOf>(path)
    }

    fn write(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        let path = normalize_path(path);
        if !self.backend.write(&path, contents, config)? {
            return Ok(false);
        }
        self.cache_contents(&path, contents, config)?;
        Ok(true)
    }

    fn update(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        let path = normalize_path(path);
        if !self.backend.update(&path, contents, config)? {
            return Ok(false);
        }
        self.cache_contents(&path, contents, config)?;
        Ok(true)
    }

    fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let (from, to) = (normalize_path(from), normalize_path(to));
        if !self.backend.rename(&from, &to)? {
            return Ok(false);
        }
        self.store.ensure_parent_directories(&to);
        self.store.rename(&from, &to)?;
        Ok(true)
    }

    fn copy(&self, path: &str, newpath: &str) -> Result<bool> {
        let (path, newpath) = (normalize_path(path), normalize_path(newpath));
        if !self.backend.copy(&path, &newpath)? {
            return Ok(false);
        }
        self.store.ensure_parent_directories(&newpath);
        self.store.copy(&path, &newpath)?;
        Ok(true)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path);
        if !self.backend.delete(&path)? {
            return Ok(false);
        }
        self.store.delete(&path)?;
        Ok(true)
    }

    fn delete_dir(&self, dirname: &str) -> Result<bool> {
        let dirname = normalize_path(dirname);
        if !self.backend.delete_dir(&dirname)? {
            return Ok(false);
        }
        self.store.delete_dir(&dirname)?;
        Ok(true)
    }

    fn create_dir(&self, dirname: &str, config: &Config) -> Result<bool> {
        let dirname = normalize_path(dirname);
        if !self.backend.create_dir(&dirname, config)? {
            return Ok(false);
        }
        self.store.ensure_parent_directories(&dirname);
        self.store.update(&dirname, Update::Directory, true)?;
        Ok(true)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        let path = normalize_path(path);
        if !self.backend.set_visibility(&path, visibility)? {
            return Ok(false);
        }
        self.store.update(&path, Update::Visibility(visibility), true)?;
        Ok(true)
    }
}
