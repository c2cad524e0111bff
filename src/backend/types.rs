//! Storage types shared by backends and the cache
//!
//! Defines file metadata records, visibility, and per-write configuration.

use serde::{Deserialize, Serialize};

/// Whether an object is readable by everyone or only its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

/// Object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata record for a file or directory
///
/// Every attribute is optional: a backend fills in what it knows, and the
/// cache fills in fields as it learns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Normalized path relative to the backend root
    pub path: String,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Last modification, seconds since the unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
}

impl FileMetadata {
    /// Create a record that only knows its path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            visibility: None,
            mimetype: None,
            timestamp: None,
            kind: None,
        }
    }

    /// Create a file record with a known size
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            size: Some(size),
            kind: Some(EntryKind::File),
            ..Self::new(path)
        }
    }

    /// Create a directory record
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            kind: Some(EntryKind::Directory),
            ..Self::new(path)
        }
    }

    /// Check if this entry represents a directory
    pub fn is_directory(&self) -> bool {
        self.kind == Some(EntryKind::Directory)
    }

    /// Copy every attribute `other` knows into this record (path is kept)
    pub fn merge(&mut self, other: &FileMetadata) {
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.visibility.is_some() {
            self.visibility = other.visibility;
        }
        if other.mimetype.is_some() {
            self.mimetype = other.mimetype.clone();
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
        if other.kind.is_some() {
            self.kind = other.kind;
        }
    }
}

/// Per-write settings passed to backend mutations
///
/// Settings not present here are looked up in the fallback config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    visibility: Option<Visibility>,
    fallback: Option<Box<Config>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config that sets the visibility of the written object
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility: Some(visibility),
            fallback: None,
        }
    }

    /// Use `fallback` for settings this config does not carry
    pub fn with_fallback(mut self, fallback: Config) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Requested visibility, if set here or in a fallback
    pub fn visibility(&self) -> Option<Visibility> {
        self.visibility
            .or_else(|| self.fallback.as_ref().and_then(|f| f.visibility()))
    }
}
