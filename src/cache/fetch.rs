//! Cache-aside reads
//!
//! One algorithm serves every cached attribute: answer from the store when it
//! knows the value or knows the object is gone, otherwise ask the backend and
//! remember the answer either way.

use tracing::{debug, trace};

use super::entry::{Lookup, MetadataEntry, Payload, Update};
use super::metadata::MetadataStore;
use crate::backend::{Backend, FileMetadata, Visibility};
use crate::error::{found, Error, Result};

/// Read `path` through the store, falling back to the backend
///
/// Returns `Ok(None)` when the object does not exist. Backend errors other
/// than not-found propagate and leave the store untouched. A not-found for a
/// path the store holds a live entry for is reported as an error; the entry
/// is never turned negative here.
pub fn fetch_with<T>(
    store: &MetadataStore,
    path: &str,
    from_cache: impl FnOnce(&MetadataStore, &str) -> Lookup<T>,
    from_backend: impl FnOnce(&str) -> Result<Option<T>>,
    write_back: impl FnOnce(&T) -> Update,
) -> Result<Option<T>> {
    match from_cache(store, path) {
        Lookup::Hit(value) => return Ok(Some(value)),
        Lookup::Miss => return Ok(None),
        Lookup::Absent => {}
    }

    trace!(path = path, "Fetching from backend");
    match from_backend(path)? {
        Some(value) => {
            store.update(path, write_back(&value), true)?;
            Ok(Some(value))
        }
        None if store.has(path) => {
            debug!(path = path, "Backend reported a cached object missing");
            Err(Error::NotFound(path.to_string()))
        }
        None => {
            store.store_miss(path)?;
            Ok(None)
        }
    }
}

/// A cacheable attribute of a path
pub trait Attribute {
    type Value;

    /// What the store knows about this attribute
    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<Self::Value>;

    /// Ask the backend; `Ok(None)` means the object does not exist
    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<Self::Value>>;

    /// How a fetched value is written into the store
    fn write_back(value: &Self::Value) -> Update;
}

/// Fetch attribute `A` of `path`
pub fn fetch<A: Attribute, B: Backend + ?Sized>(
    store: &MetadataStore,
    backend: &B,
    path: &str,
) -> Result<Option<A::Value>> {
    fetch_with(
        store,
        path,
        A::from_cache,
        |path| A::from_backend(backend, path),
        A::write_back,
    )
}

fn cached_metadata(store: &MetadataStore, path: &str) -> Lookup<FileMetadata> {
    store.lookup(path).project(|entry| Some(entry.metadata))
}

/// Existence
pub struct Exists;

impl Attribute for Exists {
    type Value = bool;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<bool> {
        store.lookup(path).project(|_| Some(true))
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<bool>> {
        Ok(backend.has(path)?.then_some(true))
    }

    fn write_back(_value: &bool) -> Update {
        Update::Exists
    }
}

/// File contents
pub struct Contents;

impl Attribute for Contents {
    type Value = String;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<String> {
        store.lookup(path).project(|entry: MetadataEntry| match entry.payload {
            Payload::Contents(contents) => Some(contents),
            _ => None,
        })
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<String>> {
        found(backend.read(path))
    }

    fn write_back(value: &String) -> Update {
        Update::Contents(value.clone())
    }
}

/// Full metadata record
///
/// A cached entry only answers once its kind is known; an entry that merely
/// records existence goes to the backend.
pub struct Metadata;

impl Attribute for Metadata {
    type Value = FileMetadata;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<FileMetadata> {
        cached_metadata(store, path).project(|metadata| metadata.kind.is_some().then_some(metadata))
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<FileMetadata>> {
        found(backend.get_metadata(path))
    }

    fn write_back(value: &FileMetadata) -> Update {
        Update::Metadata(value.clone())
    }
}

pub struct Size;

impl Attribute for Size {
    type Value = u64;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<u64> {
        cached_metadata(store, path).project(|metadata| metadata.size)
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<u64>> {
        found(backend.get_size(path))
    }

    fn write_back(value: &u64) -> Update {
        Update::Size(*value)
    }
}

pub struct Mimetype;

impl Attribute for Mimetype {
    type Value = String;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<String> {
        cached_metadata(store, path).project(|metadata| metadata.mimetype)
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<String>> {
        found(backend.get_mimetype(path))
    }

    fn write_back(value: &String) -> Update {
        Update::Mimetype(value.clone())
    }
}

pub struct Timestamp;

impl Attribute for Timestamp {
    type Value = i64;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<i64> {
        cached_metadata(store, path).project(|metadata| metadata.timestamp)
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<i64>> {
        found(backend.get_timestamp(path))
    }

    fn write_back(value: &i64) -> Update {
        Update::Timestamp(*value)
    }
}

pub struct VisibilityOf;

impl Attribute for VisibilityOf {
    type Value = Visibility;

    fn from_cache(store: &MetadataStore, path: &str) -> Lookup<Visibility> {
        cached_metadata(store, path).project(|metadata| metadata.visibility)
    }

    fn from_backend<B: Backend + ?Sized>(backend: &B, path: &str) -> Result<Option<Visibility>> {
        found(backend.get_visibility(path))
    }

    fn write_back(value: &Visibility) -> Update {
        Update::Visibility(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use std::cell::Cell;

    #[test]
    fn test_cache_hit_skips_backend() {
        let store = MetadataStore::new();
        store.update("a.txt", Update::Contents("cached".to_string()), false).unwrap();
        let calls = Cell::new(0);

        let value = fetch_with(
            &store,
            "a.txt",
            Contents::from_cache,
            |_| {
                calls.set(calls.get() + 1);
                Ok(Some("fresh".to_string()))
            },
            Contents::write_back,
        )
        .unwrap();

        assert_eq!(value.as_deref(), Some("cached"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_backend_value_is_written_back() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new().with_file("a.txt", "hello");

        let value = fetch::<Contents, _>(&store, &backend, "a.txt").unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
        assert_eq!(backend.calls(), 1);

        assert_eq!(store.get("a.txt").unwrap().contents(), Some("hello"));
        let again = fetch::<Contents, _>(&store, &backend, "a.txt").unwrap();
        assert_eq!(again.as_deref(), Some("hello"));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_not_found_is_remembered() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new();

        assert_eq!(fetch::<Size, _>(&store, &backend, "gone.txt").unwrap(), None);
        assert_eq!(backend.calls(), 1);
        assert_eq!(store.lookup("gone.txt"), Lookup::Miss);

        assert_eq!(fetch::<Contents, _>(&store, &backend, "gone.txt").unwrap(), None);
        assert_eq!(fetch::<Exists, _>(&store, &backend, "gone.txt").unwrap(), None);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_has_false_is_remembered() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new();

        assert_eq!(fetch::<Exists, _>(&store, &backend, "nope").unwrap(), None);
        assert_eq!(fetch::<Exists, _>(&store, &backend, "nope").unwrap(), None);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_backend_error_propagates() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new().with_file("a.txt", "hello");
        backend.set_broken(true);

        let err = fetch::<Contents, _>(&store, &backend, "a.txt").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(store.get("a.txt").is_none());
    }

    #[test]
    fn test_empty_contents_are_a_value() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new().with_file("empty.txt", "");

        assert_eq!(
            fetch::<Contents, _>(&store, &backend, "empty.txt").unwrap().as_deref(),
            Some("")
        );
        assert_eq!(
            fetch::<Contents, _>(&store, &backend, "empty.txt").unwrap().as_deref(),
            Some("")
        );
        assert_eq!(backend.calls(), 1);
        assert_eq!(store.get("empty.txt").unwrap().metadata.size, Some(0));
    }

    #[test]
    fn test_partial_entry_fetches_missing_attribute() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new().with_file("a.txt", "hello");
        store.update("a.txt", Update::Exists, false).unwrap();

        assert_eq!(fetch::<Exists, _>(&store, &backend, "a.txt").unwrap(), Some(true));
        assert_eq!(backend.calls(), 0);

        let metadata = fetch::<Metadata, _>(&store, &backend, "a.txt").unwrap().unwrap();
        assert_eq!(metadata.size, Some(5));
        assert_eq!(backend.calls(), 1);

        assert_eq!(fetch::<Size, _>(&store, &backend, "a.txt").unwrap(), Some(5));
        assert_eq!(
            fetch::<Mimetype, _>(&store, &backend, "a.txt").unwrap().as_deref(),
            Some("text/plain")
        );
        assert_eq!(
            fetch::<VisibilityOf, _>(&store, &backend, "a.txt").unwrap(),
            Some(Visibility::Public)
        );
        assert!(fetch::<Timestamp, _>(&store, &backend, "a.txt").unwrap().is_some());
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_live_entry_is_never_turned_negative() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new();
        store.update("a.txt", Update::Exists, false).unwrap();

        let err = fetch::<Size, _>(&store, &backend, "a.txt").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.has("a.txt"));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let store = MetadataStore::new();
        let backend = MemoryBackend::new().with_file("photos/a.jpg", "jpeg");
        store.update("photos", Update::Directory, false).unwrap();

        let err = fetch::<Contents, _>(&store, &backend, "photos").unwrap_err();
        assert!(matches!(err, Error::NotAFile(_)));
        assert_eq!(store.get("photos").unwrap().payload, Payload::Directory);
    }
}
