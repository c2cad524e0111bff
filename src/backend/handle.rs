//! File and directory handles
//!
//! A handle binds a path to the backend it came from, so callers can work
//! on one object without repeating its path.

use super::types::{Config, FileMetadata, Visibility};
use super::Backend;
use crate::error::Result;
use crate::path::normalize_path;

/// Handle returned by [`Backend::get`]
pub enum Handle<'a, B: ?Sized> {
    File(FileHandle<'a, B>),
    Directory(DirectoryHandle<'a, B>),
}

impl<'a, B: Backend + ?Sized> Handle<'a, B> {
    pub fn path(&self) -> &str {
        match self {
            Handle::File(file) => file.path(),
            Handle::Directory(dir) => dir.path(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Handle::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }
}

/// A file on a backend
pub struct FileHandle<'a, B: ?Sized> {
    backend: &'a B,
    path: String,
}

impl<'a, B: Backend + ?Sized> FileHandle<'a, B> {
    pub fn new(backend: &'a B, path: &str) -> Self {
        Self {
            backend,
            path: normalize_path(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> Result<bool> {
        self.backend.has(&self.path)
    }

    pub fn read(&self) -> Result<String> {
        self.backend.read(&self.path)
    }

    pub fn write(&self, contents: &str) -> Result<bool> {
        self.backend.write(&self.path, contents, &Config::new())
    }

    pub fn update(&self, contents: &str) -> Result<bool> {
        self.backend.update(&self.path, contents, &Config::new())
    }

    pub fn put(&self, contents: &str) -> Result<bool> {
        self.backend.put(&self.path, contents, &Config::new())
    }

    /// Move the file; the handle follows it on success
    pub fn rename(&mut self, newpath: &str) -> Result<bool> {
        let newpath = normalize_path(newpath);
        let renamed = self.backend.rename(&self.path, &newpath)?;
        if renamed {
            self.path = newpath;
        }
        Ok(renamed)
    }

    /// Copy the file, returning a handle to the copy
    pub fn copy(&self, newpath: &str) -> Result<Option<FileHandle<'a, B>>> {
        let copied = self.backend.copy(&self.path, newpath)?;
        Ok(copied.then(|| FileHandle::new(self.backend, newpath)))
    }

    pub fn delete(&self) -> Result<bool> {
        self.backend.delete(&self.path)
    }

    pub fn metadata(&self) -> Result<FileMetadata> {
        self.backend.get_metadata(&self.path)
    }

    pub fn size(&self) -> Result<u64> {
        self.backend.get_size(&self.path)
    }

    pub fn mimetype(&self) -> Result<String> {
        self.backend.get_mimetype(&self.path)
    }

    pub fn timestamp(&self) -> Result<i64> {
        self.backend.get_timestamp(&self.path)
    }

    pub fn visibility(&self) -> Result<Visibility> {
        self.backend.get_visibility(&self.path)
    }
}

/// A directory on a backend
pub struct DirectoryHandle<'a, B: ?Sized> {
    backend: &'a B,
    path: String,
}

impl<'a, B: Backend + ?Sized> DirectoryHandle<'a, B> {
    pub fn new(backend: &'a B, path: &str) -> Self {
        Self {
            backend,
            path: normalize_path(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn list(&self, recursive: bool) -> Result<Vec<FileMetadata>> {
        self.backend.list_contents(&self.path, recursive)
    }

    /// Delete the directory and everything below it
    pub fn delete(&self) -> Result<bool> {
        self.backend.delete_dir(&self.path)
    }
}
