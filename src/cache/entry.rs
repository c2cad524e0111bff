//! Cache slot types
//!
//! A slot is either live (the object exists, possibly with stale attributes)
//! or a negative entry recording that the backend reported it absent.

use serde::{Deserialize, Serialize};

use crate::backend::{EntryKind, FileMetadata, Visibility};

/// What a cache slot holds besides metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Payload {
    /// File contents are cached
    Contents(String),
    /// The object is a directory
    Directory,
    /// The object exists; contents are not cached
    Present,
    /// The backend reported the object absent
    Missing,
}

/// One cache slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    pub path: String,
    pub metadata: FileMetadata,
    pub payload: Payload,
}

impl MetadataEntry {
    /// A negative entry for `path`
    pub fn missing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            metadata: FileMetadata::new(path),
            payload: Payload::Missing,
        }
    }

    /// Whether this slot describes an existing object
    pub fn is_live(&self) -> bool {
        self.payload != Payload::Missing
    }

    /// Cached contents, if any
    pub fn contents(&self) -> Option<&str> {
        match &self.payload {
            Payload::Contents(contents) => Some(contents),
            _ => None,
        }
    }

    /// Re-key this entry under a new path
    pub fn moved_to(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self.metadata.path = path.to_string();
        self
    }

    /// Apply an attribute update, starting a fresh live entry if this slot
    /// was negative
    pub fn apply(mut self, update: Update) -> Self {
        if !self.is_live() {
            self = Self {
                payload: Payload::Present,
                metadata: FileMetadata::new(self.path.as_str()),
                path: self.path,
            };
        }

        match update {
            Update::Exists => {}
            Update::Contents(contents) => {
                self.metadata.size = Some(contents.len() as u64);
                self.metadata.kind = Some(EntryKind::File);
                self.payload = Payload::Contents(contents);
            }
            Update::Metadata(metadata) => {
                self.metadata.merge(&metadata);
                if metadata.is_directory() {
                    self.payload = Payload::Directory;
                } else if self.payload == Payload::Directory && metadata.kind.is_some() {
                    self.payload = Payload::Present;
                }
            }
            Update::Directory => {
                self.metadata.kind = Some(EntryKind::Directory);
                self.metadata.size = None;
                self.payload = Payload::Directory;
            }
            Update::Size(size) => self.metadata.size = Some(size),
            Update::Mimetype(mimetype) => self.metadata.mimetype = Some(mimetype),
            Update::Timestamp(timestamp) => self.metadata.timestamp = Some(timestamp),
            Update::Visibility(visibility) => self.metadata.visibility = Some(visibility),
        }
        self
    }
}

/// Attribute learned about a path, written into its cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The object exists
    Exists,
    /// File contents (size and kind follow from them)
    Contents(String),
    /// A metadata record from the backend
    Metadata(FileMetadata),
    Directory,
    Size(u64),
    Mimetype(String),
    Timestamp(i64),
    Visibility(Visibility),
}

/// Tri-state cache answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The cache knows the value
    Hit(T),
    /// The cache knows the object does not exist
    Miss,
    /// The cache knows nothing useful about this path
    Absent,
}

impl<T> Lookup<T> {
    /// Project a hit onto one attribute; an unknown attribute becomes `Absent`
    pub fn project<U>(self, f: impl FnOnce(T) -> Option<U>) -> Lookup<U> {
        match self {
            Lookup::Hit(value) => f(value).map_or(Lookup::Absent, Lookup::Hit),
            Lookup::Miss => Lookup::Miss,
            Lookup::Absent => Lookup::Absent,
        }
    }
}

/// How much of a directory listing the cache holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Nothing is known about the listing
    Absent,
    /// Every direct child is cached
    Shallow,
    /// Every descendant is cached
    Recursive,
}

impl Completeness {
    /// Whether a listing of the requested depth can be served from cache
    pub fn satisfies(self, recursive: bool) -> bool {
        match self {
            Completeness::Absent => false,
            Completeness::Shallow => !recursive,
            Completeness::Recursive => true,
        }
    }
}
