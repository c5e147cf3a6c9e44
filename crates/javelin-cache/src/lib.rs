//! Persistent cache directories and the stores built on top of them.
//!
//! This crate implements Javelin's multi-tier compile-cache building blocks:
//! - content keys as the sole identity of content-addressed entries
//! - disk-backed key→value tables with pluggable key/value codecs
//! - on-demand cross-process locking (taken per physical operation, never
//!   held across a build invocation)
//! - a bounded in-memory LRU layer composable over any table
//! - per-domain cache directory lifecycle (unopened → open → closed)
//!
//! ## On-disk layout (inventory)
//!
//! Each [`CacheDirectory`] root contains:
//! - `cache-info.json`: human-readable marker (display name, tool version)
//! - `.dir-lock`: directory-level lock artifact, held only while `open()`
//!   creates and validates the structure
//! - `<table>/`: one directory per named store, one `<key-fingerprint>.bin`
//!   entry file per key, each wrapped in a versioned envelope recording the
//!   schema version, the tool version, and the full serialized key
//! - `<table>.lock`: the table's on-demand lock file
//!
//! Reads are fail-safe throughout: corruption, version skew, and size-capped
//! payloads degrade to misses (deleting the offending file where that is
//! safe), because every cache entry can be recomputed from its inputs.

mod cache_dir;
mod error;
mod key;
mod lock;
mod memory;
mod serialize;
mod store;
mod util;

pub use cache_dir::{CacheConfig, CacheDirectory};
pub use error::{CacheError, Result};
pub use key::{ContentKey, CONTENT_KEY_LEN};
pub use lock::{CacheLock, LockPolicy};
pub use memory::{InMemoryDecorator, MemoryPolicy};
pub use serialize::{BincodeSerializer, ContentKeySerializer, Serializer, StringSerializer};
pub use store::{IndexedStore, PersistentIndexedStore};
pub use util::{atomic_write, now_millis, BINCODE_PAYLOAD_LIMIT_BYTES};
