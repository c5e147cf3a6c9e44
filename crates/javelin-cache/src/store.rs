use crate::cache_dir::{DirState, SharedDirState};
use crate::error::{CacheError, Result};
use crate::key::ContentKey;
use crate::lock::{CacheLock, LockPolicy};
use crate::serialize::Serializer;
use crate::util::{
    atomic_write, bincode_deserialize, bincode_serialize, now_millis, read_file_limited,
    remove_file_best_effort,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version of the on-disk entry envelope. Increment on breaking changes to
/// [`PersistedEntry`].
const STORE_SCHEMA_VERSION: u32 = 1;

/// A key→value table. Implemented by the persistent store and by the
/// in-memory decorator, so callers compose the two behind one contract.
pub trait IndexedStore<K, V> {
    fn get(&self, key: &K) -> Result<Option<V>>;
    fn put(&self, key: &K, value: &V) -> Result<()>;
}

/// Envelope wrapped around every persisted entry.
///
/// The serialized key is stored in full: entry files are named by the key's
/// fingerprint, and the full key disambiguates fingerprint collisions on
/// read.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    schema_version: u32,
    tool_version: String,
    saved_at_millis: u64,
    key: Vec<u8>,
    value: Vec<u8>,
}

/// A disk-backed key→value table with pluggable key/value codecs.
///
/// Layout: one directory per table under the owning cache directory, one
/// file per entry (`<key-fingerprint>.bin`), plus a sibling `<table>.lock`
/// used for on-demand locking. The lock is taken per physical read/write and
/// released immediately, so concurrent build processes interleave access to
/// the same table without any long-held exclusion.
pub struct PersistentIndexedStore<K, V> {
    table: String,
    table_dir: PathBuf,
    lock_path: PathBuf,
    lock_policy: LockPolicy,
    key_serializer: Box<dyn Serializer<K>>,
    value_serializer: Box<dyn Serializer<V>>,
    dir_state: SharedDirState,
}

impl<K, V> std::fmt::Debug for PersistentIndexedStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentIndexedStore")
            .field("table", &self.table)
            .field("table_dir", &self.table_dir)
            .field("lock_path", &self.lock_path)
            .field("lock_policy", &self.lock_policy)
            .field("dir_state", &self.dir_state)
            .finish_non_exhaustive()
    }
}

impl<K, V> PersistentIndexedStore<K, V> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        table: String,
        table_dir: PathBuf,
        lock_path: PathBuf,
        lock_policy: LockPolicy,
        key_serializer: Box<dyn Serializer<K>>,
        value_serializer: Box<dyn Serializer<V>>,
        dir_state: SharedDirState,
    ) -> Self {
        Self {
            table,
            table_dir,
            lock_path,
            lock_policy,
            key_serializer,
            value_serializer,
            dir_state,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn ensure_open(&self) -> Result<()> {
        let state = self
            .dir_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *state {
            DirState::Open => Ok(()),
            other => Err(CacheError::Lifecycle {
                path: self.table_dir.clone(),
                state: other.name(),
            }),
        }
    }

    fn entry_path(&self, key_bytes: &[u8]) -> PathBuf {
        let fingerprint = ContentKey::from_bytes(key_bytes);
        self.table_dir.join(format!("{}.bin", fingerprint.to_hex()))
    }
}

impl<K, V> IndexedStore<K, V> for PersistentIndexedStore<K, V> {
    fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        let path = self.entry_path(&key_bytes);

        let _lock = CacheLock::acquire(&self.lock_path, &self.lock_policy)?;
        let bytes = match read_file_limited(&path) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let entry: PersistedEntry = match bincode_deserialize(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "javelin.cache",
                    table = %self.table,
                    path = %path.display(),
                    error = %err,
                    "corrupt cache entry; treating as miss"
                );
                remove_file_best_effort(&path, "store.decode");
                return Ok(None);
            }
        };

        if entry.schema_version != STORE_SCHEMA_VERSION
            || entry.tool_version != javelin_core::JAVELIN_VERSION
        {
            // Written by another Javelin release; delete so stale entries
            // don't accumulate if they are never overwritten.
            remove_file_best_effort(&path, "store.version");
            return Ok(None);
        }

        if entry.key != key_bytes {
            // Fingerprint collision. Treat as a miss, but do **not** delete:
            // reads for one key must not erase another key's cached value.
            return Ok(None);
        }

        match self.value_serializer.deserialize(&entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::debug!(
                    target = "javelin.cache",
                    table = %self.table,
                    path = %path.display(),
                    error = %err,
                    "undecodable cache value; treating as miss"
                );
                remove_file_best_effort(&path, "store.value_decode");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        let entry = PersistedEntry {
            schema_version: STORE_SCHEMA_VERSION,
            tool_version: javelin_core::JAVELIN_VERSION.to_string(),
            saved_at_millis: now_millis(),
            key: key_bytes.clone(),
            value: value_bytes,
        };
        let bytes = bincode_serialize(&entry)?;
        let path = self.entry_path(&key_bytes);

        let _lock = CacheLock::acquire(&self.lock_path, &self.lock_policy)?;
        atomic_write(&path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_dir::CacheDirectory;
    use crate::serialize::{BincodeSerializer, ContentKeySerializer, StringSerializer};
    use tempfile::TempDir;

    fn key_store(
        dir: &CacheDirectory,
    ) -> PersistentIndexedStore<ContentKey, Vec<String>> {
        dir.create_store(
            "class-analysis",
            Box::new(ContentKeySerializer),
            Box::new(BincodeSerializer::new()),
        )
        .unwrap()
    }

    fn open_dir(tmp: &TempDir) -> CacheDirectory {
        let dir = CacheDirectory::new(tmp.path().join("compile"), "compile cache");
        dir.open().unwrap();
        dir
    }

    #[test]
    fn put_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        let value = vec!["com.example.Bar".to_string()];
        store.put(&key, &value).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn absent_key_is_none_until_put() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        assert_eq!(store.get(&key).unwrap(), None);
        assert_eq!(store.get(&key).unwrap(), None);
        store.put(&key, &vec!["dep".to_string()]).unwrap();
        assert!(store.get(&key).unwrap().is_some());
    }

    #[test]
    fn put_overwrites_unconditionally() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        store.put(&key, &vec!["old".to_string()]).unwrap();
        store.put(&key, &vec!["new".to_string()]).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(vec!["new".to_string()]));
    }

    #[test]
    fn repeated_put_of_same_value_is_stable() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        let value = vec!["dep".to_string()];
        store.put(&key, &value).unwrap();
        store.put(&key, &value).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn string_keyed_store_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store: PersistentIndexedStore<String, Vec<u32>> = dir
            .create_store(
                "task-history",
                Box::new(StringSerializer),
                Box::new(BincodeSerializer::new()),
            )
            .unwrap();

        let key = ":app:compileJava".to_string();
        store.put(&key, &vec![1, 2, 3]).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn corrupt_entry_is_miss_and_removed() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        store.put(&key, &vec!["dep".to_string()]).unwrap();

        let path = store.entry_path(key.as_bytes());
        std::fs::write(&path, b"definitely not bincode").unwrap();

        assert_eq!(store.get(&key).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn tool_version_mismatch_is_miss_and_removed() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let key = ContentKey::from_bytes(b"Foo.class");
        store.put(&key, &vec!["dep".to_string()]).unwrap();

        let path = store.entry_path(key.as_bytes());
        let bytes = std::fs::read(&path).unwrap();
        let mut entry: PersistedEntry = bincode_deserialize(&bytes).unwrap();
        entry.tool_version = "0.0.0-other".to_string();
        std::fs::write(&path, bincode_serialize(&entry).unwrap()).unwrap();

        assert_eq!(store.get(&key).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn fingerprint_collision_is_miss_without_delete() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let stored_key = ContentKey::from_bytes(b"Bar.class");
        let probe_key = ContentKey::from_bytes(b"Foo.class");

        // Simulate a collision: a valid entry for `stored_key` sitting at
        // `probe_key`'s file name.
        let entry = PersistedEntry {
            schema_version: STORE_SCHEMA_VERSION,
            tool_version: javelin_core::JAVELIN_VERSION.to_string(),
            saved_at_millis: now_millis(),
            key: stored_key.as_bytes().to_vec(),
            value: bincode_serialize(&vec!["dep".to_string()]).unwrap(),
        };
        let path = store.entry_path(probe_key.as_bytes());
        std::fs::write(&path, bincode_serialize(&entry).unwrap()).unwrap();

        assert_eq!(store.get(&probe_key).unwrap(), None);
        assert!(path.exists());
    }

    #[test]
    fn lock_budget_exhaustion_surfaces_as_unavailable() {
        let tmp = TempDir::new().unwrap();
        let dir = CacheDirectory::new(tmp.path().join("compile"), "compile cache")
            .with_lock_policy(LockPolicy::no_retry());
        dir.open().unwrap();
        let store = key_store(&dir);

        let _held = CacheLock::acquire(
            &tmp.path().join("compile").join("class-analysis.lock"),
            &LockPolicy::default(),
        )
        .unwrap();

        let key = ContentKey::from_bytes(b"Foo.class");
        let err = store.get(&key).unwrap_err();
        assert!(matches!(err, CacheError::Unavailable { .. }));
        let err = store.put(&key, &vec!["dep".to_string()]).unwrap_err();
        assert!(matches!(err, CacheError::Unavailable { .. }));
    }

    #[test]
    fn distinct_keys_use_distinct_entry_files() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = key_store(&dir);

        let a = ContentKey::from_bytes(b"A.class");
        let b = ContentKey::from_bytes(b"B.class");
        store.put(&a, &vec!["a".to_string()]).unwrap();
        store.put(&b, &vec!["b".to_string()]).unwrap();

        assert_eq!(store.get(&a).unwrap(), Some(vec!["a".to_string()]));
        assert_eq!(store.get(&b).unwrap(), Some(vec!["b".to_string()]));
    }
}
