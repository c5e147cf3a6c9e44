use crate::error::{CacheError, Result};
use fs2::FileExt as _;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use std::time::Duration;

/// Retry budget for acquiring a [`CacheLock`].
///
/// Locks are taken per physical read/write, so contention windows are short;
/// the default budget keeps the worst-case wait well under a second so a
/// wedged lock degrades into a miss instead of stalling the build.
#[derive(Clone, Copy, Debug)]
pub struct LockPolicy {
    /// Number of acquisition attempts before giving up.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubled after each failure.
    pub initial_backoff: Duration,
    /// Cap on the per-attempt backoff.
    pub max_backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(50),
        }
    }
}

impl LockPolicy {
    /// A policy that fails on the first contended attempt. Test hook.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// A filesystem-backed lock shared safely across build processes.
///
/// The lock is released when the returned value is dropped.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    // `fs2` file locks are process-scoped on Unix platforms (they don't
    // exclude other threads in the same process). Keep an in-process mutex
    // guard to ensure mutual exclusion between threads, while the file lock
    // continues to provide cross-process coordination.
    _guard: MutexGuard<'static, ()>,
}

impl CacheLock {
    /// Acquire an exclusive lock on `path`, creating the lockfile if needed.
    ///
    /// Contended attempts retry with exponential backoff until the policy's
    /// budget is spent, then fail with [`CacheError::Unavailable`].
    pub fn acquire(path: &Path, policy: &LockPolicy) -> Result<Self> {
        let mut backoff = policy.initial_backoff;
        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
        }
        Err(CacheError::Unavailable {
            path: path.to_path_buf(),
            attempts: policy.max_attempts,
        })
    }

    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let mutex = process_lock_for_path(path);
        let guard = match mutex.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                _guard: guard,
            })),
            Err(err)
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn process_lock_for_path(path: &Path) -> &'static Mutex<()> {
    static PROCESS_LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let locks = PROCESS_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));

    let mut map = locks
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = map.get(path) {
        return existing;
    }

    let mutex: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));
    map.insert(path.to_path_buf(), mutex);
    mutex
}
