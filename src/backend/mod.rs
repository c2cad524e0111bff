//! Storage backends
//!
//! A backend performs the actual file and directory I/O. The cache layer
//! implements the same trait so it can stand in for any backend.

pub mod handle;
pub mod local;
pub mod types;

pub use handle::{DirectoryHandle, FileHandle, Handle};
pub use local::LocalBackend;
pub use types::*;

use crate::error::Result;

/// Operations every storage backend provides
///
/// Paths are normalized and relative to the backend root. Mutations return
/// `Ok(true)` on success and `Ok(false)` when the backend declined without
/// raising an error.
pub trait Backend: Send + Sync {
    /// Check whether a file or directory exists
    fn has(&self, path: &str) -> Result<bool>;

    /// Read a file's contents
    fn read(&self, path: &str) -> Result<String>;

    /// List a directory, optionally including all descendants
    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<FileMetadata>>;

    fn get_metadata(&self, path: &str) -> Result<FileMetadata>;

    fn get_size(&self, path: &str) -> Result<u64>;

    fn get_mimetype(&self, path: &str) -> Result<String>;

    /// Last modification time in seconds since the unix epoch
    fn get_timestamp(&self, path: &str) -> Result<i64>;

    fn get_visibility(&self, path: &str) -> Result<Visibility>;

    /// Write a new file
    fn write(&self, path: &str, contents: &str, config: &Config) -> Result<bool>;

    /// Overwrite an existing file
    fn update(&self, path: &str, contents: &str, config: &Config) -> Result<bool>;

    fn rename(&self, from: &str, to: &str) -> Result<bool>;

    fn copy(&self, path: &str, newpath: &str) -> Result<bool>;

    /// Delete a file
    fn delete(&self, path: &str) -> Result<bool>;

    /// Delete a directory and everything below it
    fn delete_dir(&self, dirname: &str) -> Result<bool>;

    fn create_dir(&self, dirname: &str, config: &Config) -> Result<bool>;

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool>;

    /// Write a file, replacing it if it already exists
    fn put(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        if self.has(path)? {
            self.update(path, contents, config)
        } else {
            self.write(path, contents, config)
        }
    }

    /// Read a file, then delete it
    fn read_and_delete(&self, path: &str) -> Result<String> {
        let contents = self.read(path)?;
        self.delete(path)?;
        Ok(contents)
    }

    /// Handle for the file or directory at `path`
    fn get(&self, path: &str) -> Result<Handle<'_, Self>>
    where
        Self: Sized,
    {
        let metadata = self.get_metadata(path)?;
        Ok(if metadata.is_directory() {
            Handle::Directory(DirectoryHandle::new(self, path))
        } else {
            Handle::File(FileHandle::new(self, path))
        })
    }
}
