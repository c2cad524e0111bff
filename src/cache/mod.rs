//! Metadata caching layer
//!
//! Keeps file and directory metadata (and file contents) of a backend in a
//! Moka-backed store, including negative entries for paths the backend
//! reported missing and per-directory listing completeness.

pub mod adapter;
pub mod entry;
pub mod fetch;
pub mod metadata;
pub mod snapshot;

pub use adapter::CachedBackend;
pub use entry::{Completeness, Lookup, MetadataEntry, Payload, Update};
pub use metadata::{MetadataStore, StoreConfig};
pub use snapshot::{JsonFileStore, MemorySnapshotStore, NoopSnapshotStore, Snapshot, SnapshotStore};
