use crate::error::Result;
use crate::store::IndexedStore;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// In-memory retention policy for a decorated store.
///
/// Class-level entries are numerous and cheap, so their layer is sized in the
/// hundreds of thousands; classpath-entry snapshots are larger and fewer, so
/// theirs is in the tens of thousands; previous-compilation records are read
/// at most once or twice per build, so they skip memory entirely.
#[derive(Clone, Copy, Debug)]
pub enum MemoryPolicy {
    /// Keep up to this many entries, evicting least-recently-used.
    Bounded(usize),
    /// No in-memory retention; every access goes to the inner store.
    Disabled,
}

/// A bounded least-recently-used layer in front of another store.
///
/// Avoids repeated deserialization and disk I/O for hot keys within one
/// process lifetime. Strictly process-local: a value cached here may be stale
/// with respect to another process's write, which is safe because
/// content-addressed entries never change under their key and identity-keyed
/// records have a single legitimate writer per key.
pub struct InMemoryDecorator<K: Hash + Eq, V, S> {
    inner: S,
    memory: Option<Mutex<LruCache<K, V>>>,
}

impl<K, V, S> InMemoryDecorator<K, V, S>
where
    K: Hash + Eq,
{
    pub fn new(inner: S, policy: MemoryPolicy) -> Self {
        let memory = match policy {
            // A zero capacity stores nothing; treat it like a disabled layer.
            MemoryPolicy::Bounded(capacity) => {
                NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity)))
            }
            MemoryPolicy::Disabled => None,
        };
        Self { inner, memory }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of entries currently retained in memory.
    pub fn retained(&self) -> usize {
        self.memory
            .as_ref()
            .map(|memory| lock_memory(memory).len())
            .unwrap_or(0)
    }
}

impl<K, V, S> IndexedStore<K, V> for InMemoryDecorator<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: IndexedStore<K, V>,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        if let Some(memory) = &self.memory {
            if let Some(hit) = lock_memory(memory).get(key) {
                return Ok(Some(hit.clone()));
            }
        }

        let value = self.inner.get(key)?;
        if let (Some(memory), Some(value)) = (&self.memory, &value) {
            lock_memory(memory).put(key.clone(), value.clone());
        }
        Ok(value)
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        // Write through first: durability must survive process exit, so
        // nothing is ever buffered only in memory.
        self.inner.put(key, value)?;
        if let Some(memory) = &self.memory {
            lock_memory(memory).put(key.clone(), value.clone());
        }
        Ok(())
    }
}

fn lock_memory<K: Hash + Eq, V>(
    memory: &Mutex<LruCache<K, V>>,
) -> std::sync::MutexGuard<'_, LruCache<K, V>> {
    memory
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
