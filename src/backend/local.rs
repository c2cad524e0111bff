//! Local disk backend
//!
//! Stores objects as plain files below a root directory. Writes go through a
//! temp file in the target directory and are persisted over the target, so a
//! reader never sees a half-written file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info};

use super::types::{Config, EntryKind, FileMetadata, Visibility};
use super::Backend;
use crate::error::{Error, Result};
use crate::path::{guess_mimetype, normalize_path};

/// MIME type reported for directories
const DIRECTORY_MIMETYPE: &str = "inode/directory";

/// Backend over a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Canonical root directory
    root: PathBuf,
}

impl LocalBackend {
    /// Open a backend rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;

        if !root.is_dir() || fs::read_dir(&root).is_err() {
            return Err(Error::InvalidRoot(format!(
                "The root path {} is not readable",
                root.display()
            )));
        }

        info!(root = %root.display(), "Local backend ready");
        Ok(Self { root })
    }

    /// Get the root directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }

    /// Resolve a path that must exist
    fn existing(&self, path: &str) -> Result<(PathBuf, fs::Metadata)> {
        let full = self.full_path(path);
        match fs::metadata(&full) {
            Ok(meta) => Ok((full, meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a path that must be a regular file
    fn existing_file(&self, path: &str) -> Result<(PathBuf, fs::Metadata)> {
        let (full, meta) = self.existing(path)?;
        if meta.is_dir() {
            return Err(Error::NotAFile(path.to_string()));
        }
        Ok((full, meta))
    }

    fn ensure_absent(&self, path: &str) -> Result<PathBuf> {
        let full = self.full_path(path);
        if full.try_exists()? {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        Ok(full)
    }

    fn ensure_parent(full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Write contents atomically using a temp file next to the target
    fn write_atomic(full: &Path, contents: &str) -> Result<()> {
        Self::ensure_parent(full)?;
        let parent = full.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(full).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Convert a filesystem path below the root to a cache key
    fn relative(&self, full: &Path) -> String {
        let rel = full.strip_prefix(&self.root).unwrap_or(full);
        normalize_path(&rel.to_string_lossy())
    }

    fn to_metadata(path: String, meta: &fs::Metadata) -> FileMetadata {
        let is_dir = meta.is_dir();
        let timestamp = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok());
        let mimetype = if is_dir {
            DIRECTORY_MIMETYPE.to_string()
        } else {
            guess_mimetype(&path).to_string()
        };

        FileMetadata {
            size: if is_dir { None } else { Some(meta.len()) },
            visibility: Some(visibility_of(meta)),
            mimetype: Some(mimetype),
            timestamp,
            kind: Some(if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            }),
            path,
        }
    }

    fn collect(&self, dir: &Path, recursive: bool, out: &mut Vec<FileMetadata>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.file_type().is_symlink() {
                debug!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }

            let full = entry.path();
            out.push(Self::to_metadata(self.relative(&full), &meta));

            if recursive && meta.is_dir() {
                self.collect(&full, recursive, out)?;
            }
        }
        Ok(())
    }
}

impl Backend for LocalBackend {
    fn has(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).try_exists()?)
    }

    fn read(&self, path: &str) -> Result<String> {
        let (full, _) = self.existing_file(path)?;
        Ok(fs::read_to_string(full)?)
    }

    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<FileMetadata>> {
        let full = self.full_path(directory);
        if !full.is_dir() {
            return Err(Error::DirectoryNotFound(directory.to_string()));
        }

        let mut entries = Vec::new();
        self.collect(&full, recursive, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(directory = directory, recursive = recursive, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        let (_, meta) = self.existing(path)?;
        Ok(Self::to_metadata(normalize_path(path), &meta))
    }

    fn get_size(&self, path: &str) -> Result<u64> {
        let (_, meta) = self.existing_file(path)?;
        Ok(meta.len())
    }

    fn get_mimetype(&self, path: &str) -> Result<String> {
        let (_, meta) = self.existing(path)?;
        if meta.is_dir() {
            return Ok(DIRECTORY_MIMETYPE.to_string());
        }
        Ok(guess_mimetype(path).to_string())
    }

    fn get_timestamp(&self, path: &str) -> Result<i64> {
        let (_, meta) = self.existing(path)?;
        let since_epoch = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX))
    }

    fn get_visibility(&self, path: &str) -> Result<Visibility> {
        let (_, meta) = self.existing(path)?;
        Ok(visibility_of(&meta))
    }

    fn write(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        let full = self.ensure_absent(path)?;
        Self::write_atomic(&full, contents)?;
        apply_visibility(&full, false, config.visibility().unwrap_or(Visibility::Public))?;

        debug!(path = path, size = contents.len(), "Wrote file");
        Ok(true)
    }

    fn update(&self, path: &str, contents: &str, config: &Config) -> Result<bool> {
        let (full, meta) = self.existing_file(path)?;
        let previous = visibility_of(&meta);
        Self::write_atomic(&full, contents)?;
        apply_visibility(&full, false, config.visibility().unwrap_or(previous))?;

        debug!(path = path, size = contents.len(), "Updated file");
        Ok(true)
    }

    fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let (source, _) = self.existing(from)?;
        let target = self.ensure_absent(to)?;
        Self::ensure_parent(&target)?;
        fs::rename(&source, &target)?;

        debug!(from = from, to = to, "Renamed");
        Ok(true)
    }

    fn copy(&self, path: &str, newpath: &str) -> Result<bool> {
        let (source, _) = self.existing_file(path)?;
        let target = self.ensure_absent(newpath)?;
        Self::ensure_parent(&target)?;
        fs::copy(&source, &target)?;

        debug!(from = path, to = newpath, "Copied file");
        Ok(true)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let (full, _) = self.existing_file(path)?;
        fs::remove_file(full)?;

        debug!(path = path, "Deleted file");
        Ok(true)
    }

    fn delete_dir(&self, dirname: &str) -> Result<bool> {
        if normalize_path(dirname).is_empty() {
            return Ok(false);
        }
        let full = self.full_path(dirname);
        if !full.is_dir() {
            return Err(Error::DirectoryNotFound(dirname.to_string()));
        }
        fs::remove_dir_all(full)?;

        debug!(dirname = dirname, "Deleted directory");
        Ok(true)
    }

    fn create_dir(&self, dirname: &str, config: &Config) -> Result<bool> {
        let full = self.full_path(dirname);
        fs::create_dir_all(&full)?;
        apply_visibility(&full, true, config.visibility().unwrap_or(Visibility::Public))?;

        debug!(dirname = dirname, "Created directory");
        Ok(true)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<bool> {
        let (full, meta) = self.existing(path)?;
        apply_visibility(&full, meta.is_dir(), visibility)?;
        Ok(true)
    }
}

/// Map permission bits to visibility: group/other readable means public
#[cfg(unix)]
fn visibility_of(meta: &fs::Metadata) -> Visibility {
    use std::os::unix::fs::PermissionsExt;

    if meta.permissions().mode() & 0o044 != 0 {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

#[cfg(not(unix))]
fn visibility_of(_meta: &fs::Metadata) -> Visibility {
    Visibility::Public
}

/// Permissions: 755/700 for directories, 644/600 for files
#[cfg(unix)]
fn apply_visibility(full: &Path, is_dir: bool, visibility: Visibility) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match (is_dir, visibility) {
        (true, Visibility::Public) => 0o755,
        (true, Visibility::Private) => 0o700,
        (false, Visibility::Public) => 0o644,
        (false, Visibility::Private) => 0o600,
    };
    fs::set_permissions(full, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_visibility(_full: &Path, _is_dir: bool, _visibility: Visibility) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, LocalBackend) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, backend) = backend();

        assert!(!backend.has("notes/a.txt").unwrap());
        assert!(backend.write("notes/a.txt", "hello", &Config::new()).unwrap());
        assert!(backend.has("notes/a.txt").unwrap());
        assert!(backend.has("notes").unwrap());
        assert_eq!(backend.read("notes/a.txt").unwrap(), "hello");
        assert_eq!(backend.get_size("notes/a.txt").unwrap(), 5);
        assert_eq!(backend.get_mimetype("notes/a.txt").unwrap(), "text/plain");
        assert!(backend.get_timestamp("notes/a.txt").unwrap() > 0);
    }

    #[test]
    fn test_write_existing_fails() {
        let (_dir, backend) = backend();
        backend.write("a.txt", "one", &Config::new()).unwrap();

        let err = backend.write("a.txt", "two", &Config::new()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(backend.read("a.txt").unwrap(), "one");
    }

    #[test]
    fn test_update_requires_existing() {
        let (_dir, backend) = backend();
        let err = backend.update("a.txt", "x", &Config::new()).unwrap_err();
        assert!(err.is_not_found());

        backend.write("a.txt", "one", &Config::new()).unwrap();
        assert!(backend.update("a.txt", "", &Config::new()).unwrap());
        assert_eq!(backend.read("a.txt").unwrap(), "");
    }

    #[test]
    fn test_rename_and_copy() {
        let (_dir, backend) = backend();
        backend.write("old.txt", "hi", &Config::new()).unwrap();

        assert!(backend.rename("old.txt", "moved/new.txt").unwrap());
        assert!(!backend.has("old.txt").unwrap());
        assert_eq!(backend.read("moved/new.txt").unwrap(), "hi");

        assert!(backend.copy("moved/new.txt", "copy.txt").unwrap());
        assert_eq!(backend.read("copy.txt").unwrap(), "hi");

        let err = backend.copy("moved/new.txt", "copy.txt").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = backend.rename("missing.txt", "x.txt").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_and_delete_dir() {
        let (_dir, backend) = backend();
        backend.write("dir/a.txt", "a", &Config::new()).unwrap();
        backend.write("dir/sub/b.txt", "b", &Config::new()).unwrap();

        assert!(backend.delete("dir/a.txt").unwrap());
        assert!(backend.delete("dir/a.txt").unwrap_err().is_not_found());
        assert!(matches!(backend.delete("dir").unwrap_err(), Error::NotAFile(_)));
        assert!(matches!(backend.read("dir").unwrap_err(), Error::NotAFile(_)));

        assert!(backend.delete_dir("dir").unwrap());
        assert!(!backend.has("dir/sub/b.txt").unwrap());
        assert!(matches!(
            backend.delete_dir("dir").unwrap_err(),
            Error::DirectoryNotFound(_)
        ));
        assert!(!backend.delete_dir("").unwrap());
    }

    #[test]
    fn test_list_contents() {
        let (_dir, backend) = backend();
        backend.write("dir/a.txt", "a", &Config::new()).unwrap();
        backend.write("dir/sub/b.txt", "bb", &Config::new()).unwrap();
        backend.write("top.txt", "t", &Config::new()).unwrap();

        let shallow: Vec<String> = backend
            .list_contents("dir", false)
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(shallow, vec!["dir/a.txt", "dir/sub"]);

        let deep = backend.list_contents("dir", true).unwrap();
        let paths: Vec<&str> = deep.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["dir/a.txt", "dir/sub", "dir/sub/b.txt"]);
        assert!(deep[1].is_directory());
        assert_eq!(deep[2].size, Some(2));

        assert!(backend.list_contents("nope", false).unwrap_err().is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn test_visibility_roundtrip() {
        let (_dir, backend) = backend();
        backend
            .write("secret.txt", "s", &Config::with_visibility(Visibility::Private))
            .unwrap();
        assert_eq!(backend.get_visibility("secret.txt").unwrap(), Visibility::Private);

        assert!(backend.set_visibility("secret.txt", Visibility::Public).unwrap());
        assert_eq!(backend.get_visibility("secret.txt").unwrap(), Visibility::Public);

        // update keeps the previous visibility unless the config overrides it
        backend.set_visibility("secret.txt", Visibility::Private).unwrap();
        backend.update("secret.txt", "t", &Config::new()).unwrap();
        assert_eq!(backend.get_visibility("secret.txt").unwrap(), Visibility::Private);
    }

    #[test]
    fn test_get_metadata() {
        let (_dir, backend) = backend();
        backend.create_dir("photos", &Config::new()).unwrap();
        backend.write("photos/alice.jpg", "jpeg", &Config::new()).unwrap();

        let dir = backend.get_metadata("photos/").unwrap();
        assert_eq!(dir.path, "photos");
        assert!(dir.is_directory());

        let file = backend.get_metadata("photos/alice.jpg").unwrap();
        assert_eq!(file.kind, Some(EntryKind::File));
        assert_eq!(file.size, Some(4));
        assert_eq!(file.mimetype.as_deref(), Some("image/jpeg"));

        assert!(backend.get_metadata("photos/bob.png").unwrap_err().is_not_found());
    }
}
