//! metacache - metadata caching layer for storage backends
//!
//! Wrap any [`Backend`] in a [`CachedBackend`] to answer existence,
//! metadata, contents and listing queries from memory, with optional
//! snapshot persistence between runs.

pub mod backend;
pub mod cache;
pub mod error;
pub mod path;

#[cfg(test)]
mod testing;

pub use backend::{Backend, Config, EntryKind, FileMetadata, LocalBackend, Visibility};
pub use cache::{CachedBackend, JsonFileStore, MetadataStore, StoreConfig};
pub use error::{Error, PersistError, Result};
