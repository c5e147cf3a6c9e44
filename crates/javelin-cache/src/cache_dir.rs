use crate::error::{CacheError, Result};
use crate::lock::{CacheLock, LockPolicy};
use crate::serialize::Serializer;
use crate::store::PersistentIndexedStore;
use crate::util::{atomic_write, now_millis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// File name of the directory-level lock artifact.
///
/// The lock is held only while `open()` creates and validates the directory
/// structure; per-entry access is guarded by each table's own on-demand lock,
/// so concurrent builds can share the directory while it is open.
const DIR_LOCK_FILE: &str = ".dir-lock";

/// Human-readable marker written next to the tables. Diagnostic only; entry
/// envelopes carry their own version gates.
const DIR_INFO_FILE: &str = "cache-info.json";

/// Configuration for selecting the on-disk cache root.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// Override the shared cache root (domain directories are still appended).
    pub cache_root_override: Option<PathBuf>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            cache_root_override: std::env::var_os("JAVELIN_CACHE_DIR").map(PathBuf::from),
        }
    }

    /// The shared cache root: the override if set, `~/.javelin/cache`
    /// otherwise.
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_root_override {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(),
        }
    }
}

fn default_cache_root() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;
    Ok(home.join(".javelin").join("cache"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DirState {
    Unopened,
    Open,
    Closed,
}

impl DirState {
    pub(crate) fn name(self) -> &'static str {
        match self {
            DirState::Unopened => "unopened",
            DirState::Open => "open",
            DirState::Closed => "closed",
        }
    }
}

pub(crate) type SharedDirState = Arc<Mutex<DirState>>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheDirInfo {
    display_name: String,
    tool_version: String,
    created_at_millis: u64,
}

/// One physical cache directory scoped to a single logical cache domain.
///
/// Lifecycle: constructed unopened, `open()`ed once by the owning scope, and
/// `close()`d deterministically at the end of it. Tables are created with
/// [`CacheDirectory::create_store`] while open; closing invalidates every
/// store created from this directory.
#[derive(Debug)]
pub struct CacheDirectory {
    root: PathBuf,
    display_name: String,
    lock_policy: LockPolicy,
    state: SharedDirState,
}

impl CacheDirectory {
    /// Describe a cache directory without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            display_name: display_name.into(),
            lock_policy: LockPolicy::default(),
            state: Arc::new(Mutex::new(DirState::Unopened)),
        }
    }

    /// Replace the lock retry budget used by this directory and its tables.
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_open(&self) -> bool {
        *self.lock_state() == DirState::Open
    }

    /// Create the directory structure and transition to the open state.
    ///
    /// The directory-level lock is held only for the duration of this call;
    /// it guards structure creation against concurrent openers, not per-entry
    /// access. Opening an already-open directory is a no-op; opening a closed
    /// one is a lifecycle error. Failure here is fatal to caching: without a
    /// directory there is nowhere to put any table.
    pub fn open(&self) -> Result<()> {
        let mut state = self.lock_state();
        match *state {
            DirState::Open => return Ok(()),
            DirState::Closed => {
                return Err(CacheError::Lifecycle {
                    path: self.root.clone(),
                    state: DirState::Closed.name(),
                })
            }
            DirState::Unopened => {}
        }

        std::fs::create_dir_all(&self.root)?;
        let _lock = CacheLock::acquire(&self.root.join(DIR_LOCK_FILE), &self.lock_policy)?;
        self.write_info_marker();

        *state = DirState::Open;
        tracing::debug!(
            target = "javelin.cache",
            root = %self.root.display(),
            display_name = %self.display_name,
            "opened cache directory"
        );
        Ok(())
    }

    /// Create (or reopen) a named key→value table inside this directory.
    ///
    /// Legal only while open. The table name doubles as the on-disk directory
    /// name, so it must be a plain path component.
    pub fn create_store<K, V>(
        &self,
        name: &str,
        key_serializer: Box<dyn Serializer<K>>,
        value_serializer: Box<dyn Serializer<V>>,
    ) -> Result<PersistentIndexedStore<K, V>> {
        let state = self.lock_state();
        if *state != DirState::Open {
            return Err(CacheError::Lifecycle {
                path: self.root.clone(),
                state: state.name(),
            });
        }

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CacheError::Format {
                message: format!("invalid cache table name {name:?}"),
            });
        }

        let table_dir = self.root.join(name);
        std::fs::create_dir_all(&table_dir)?;

        Ok(PersistentIndexedStore::new(
            name.to_string(),
            table_dir,
            self.root.join(format!("{name}.lock")),
            self.lock_policy,
            key_serializer,
            value_serializer,
            self.state.clone(),
        ))
    }

    /// Transition to the closed state.
    ///
    /// Idempotent and legal from any state; stores created from this
    /// directory fail explicitly afterwards. No exclusive lock is held while
    /// open, so an unclosed directory never blocks other processes; closing
    /// is deterministic scope teardown, not lock release for peers.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if *state == DirState::Closed {
            return;
        }
        *state = DirState::Closed;
        tracing::debug!(
            target = "javelin.cache",
            root = %self.root.display(),
            display_name = %self.display_name,
            "closed cache directory"
        );
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DirState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_info_marker(&self) {
        let info_path = self.root.join(DIR_INFO_FILE);
        if info_path.exists() {
            return;
        }
        let info = CacheDirInfo {
            display_name: self.display_name.clone(),
            tool_version: javelin_core::JAVELIN_VERSION.to_string(),
            created_at_millis: now_millis(),
        };
        let result = serde_json::to_vec_pretty(&info)
            .map_err(|err| CacheError::Format {
                message: err.to_string(),
            })
            .and_then(|bytes| atomic_write(&info_path, &bytes));
        if let Err(err) = result {
            tracing::debug!(
                target = "javelin.cache",
                path = %info_path.display(),
                error = %err,
                "failed to write cache directory marker (best effort)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{BincodeSerializer, StringSerializer};
    use crate::store::IndexedStore;
    use tempfile::TempDir;

    fn open_dir(tmp: &TempDir) -> CacheDirectory {
        let dir = CacheDirectory::new(tmp.path().join("compile"), "compile cache");
        dir.open().unwrap();
        dir
    }

    #[test]
    fn open_creates_structure_and_artifacts() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        assert!(dir.is_open());
        assert!(dir.root().join(DIR_LOCK_FILE).exists());
        assert!(dir.root().join(DIR_INFO_FILE).exists());
    }

    #[test]
    fn open_is_idempotent_while_open() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        dir.open().unwrap();
        assert!(dir.is_open());
    }

    #[test]
    fn create_store_before_open_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = CacheDirectory::new(tmp.path().join("compile"), "compile cache");
        let err = dir
            .create_store::<String, String>(
                "task-history",
                Box::new(StringSerializer),
                Box::new(BincodeSerializer::new()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Lifecycle {
                state: "unopened",
                ..
            }
        ));
    }

    #[test]
    fn create_store_after_close_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        dir.close();
        let err = dir
            .create_store::<String, String>(
                "task-history",
                Box::new(StringSerializer),
                Box::new(BincodeSerializer::new()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Lifecycle { state: "closed", .. }
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        dir.close();
        dir.close();
        assert!(!dir.is_open());
    }

    #[test]
    fn close_without_open_is_safe() {
        let tmp = TempDir::new().unwrap();
        let dir = CacheDirectory::new(tmp.path().join("compile"), "compile cache");
        dir.close();
        assert!(!dir.is_open());
    }

    #[test]
    fn reopen_after_close_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        dir.close();
        let err = dir.open().unwrap_err();
        assert!(matches!(
            err,
            CacheError::Lifecycle { state: "closed", .. }
        ));
    }

    #[test]
    fn close_invalidates_existing_stores() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let store = dir
            .create_store::<String, String>(
                "task-history",
                Box::new(StringSerializer),
                Box::new(BincodeSerializer::new()),
            )
            .unwrap();
        store
            .put(&"key".to_string(), &"value".to_string())
            .unwrap();
        dir.close();
        let err = store.get(&"key".to_string()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Lifecycle { state: "closed", .. }
        ));
    }

    #[test]
    fn invalid_table_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = open_dir(&tmp);
        let err = dir
            .create_store::<String, String>(
                "../escape",
                Box::new(StringSerializer),
                Box::new(BincodeSerializer::new()),
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::Format { .. }));
    }

    #[test]
    fn config_override_wins_over_default() {
        let config = CacheConfig {
            cache_root_override: Some(PathBuf::from("/opt/build/cache")),
        };
        assert_eq!(
            config.cache_root().unwrap(),
            PathBuf::from("/opt/build/cache")
        );
    }
}
