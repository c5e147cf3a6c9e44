use crate::analysis::ClassAnalysis;
use crate::{read_or_miss, write_best_effort};
use javelin_cache::{
    BincodeSerializer, CacheDirectory, ContentKey, ContentKeySerializer, InMemoryDecorator,
    IndexedStore, MemoryPolicy, PersistentIndexedStore, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk table name for classpath-entry snapshots, identical in the global
/// and local directories.
pub(crate) const CLASSPATH_SNAPSHOT_TABLE: &str = "classpath-snapshots";

/// In-memory capacity for classpath-entry snapshots. Entries are larger and
/// far fewer than class analyses.
const CLASSPATH_SNAPSHOT_MEMORY_CAPACITY: usize = 20_000;

/// Aggregated analysis of a set of classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSetAnalysis {
    /// Per-class analyses, keyed by binary class name.
    pub classes: BTreeMap<String, ClassAnalysis>,
}

/// The summarized contents of one classpath entry (a jar file or a class
/// directory), keyed by the content key of the whole entry.
///
/// Immutable once written: a byte-identical jar always summarizes to the
/// same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathEntrySnapshot {
    /// Content key of each class file in the entry, keyed by binary class
    /// name.
    pub class_keys: BTreeMap<String, ContentKey>,
    /// Aggregated structural analysis of the entry's classes.
    pub analysis: ClassSetAnalysis,
}

type SnapshotTable = InMemoryDecorator<
    ContentKey,
    ClasspathEntrySnapshot,
    PersistentIndexedStore<ContentKey, ClasspathEntrySnapshot>,
>;

/// Content-addressed cache of classpath-entry snapshots backed by one cache
/// directory.
///
/// Cheaply cloneable; clones share the same backing table and in-memory
/// layer.
#[derive(Clone)]
pub struct ClasspathEntrySnapshotCache {
    store: Arc<SnapshotTable>,
}

impl ClasspathEntrySnapshotCache {
    pub(crate) fn new(dir: &CacheDirectory) -> Result<Self> {
        let store = dir.create_store(
            CLASSPATH_SNAPSHOT_TABLE,
            Box::new(ContentKeySerializer),
            Box::new(BincodeSerializer::new()),
        )?;
        Ok(Self {
            store: Arc::new(InMemoryDecorator::new(
                store,
                MemoryPolicy::Bounded(CLASSPATH_SNAPSHOT_MEMORY_CAPACITY),
            )),
        })
    }

    /// Fail-safe lookup: any cache-level failure is a miss.
    pub fn get(&self, key: &ContentKey) -> Option<ClasspathEntrySnapshot> {
        read_or_miss(self.store.get(key), CLASSPATH_SNAPSHOT_TABLE)
    }

    /// Best-effort insert.
    pub fn put(&self, key: ContentKey, snapshot: &ClasspathEntrySnapshot) {
        write_best_effort(self.store.put(&key, snapshot), CLASSPATH_SNAPSHOT_TABLE);
    }
}

/// Classifies file locations for cache routing.
///
/// The concrete rule is build-environment policy and is injected by the
/// embedder; a wrong classification only affects hit rate, never
/// correctness.
pub trait WellKnownLocations: Send + Sync {
    /// Whether `path` is a stable location reused verbatim across unrelated
    /// builds (e.g. a shared dependency repository), as opposed to a path
    /// inside some build's own output tree.
    fn is_well_known(&self, path: &Path) -> bool;
}

/// Prefix-list classifier: a location is well known when it sits under any
/// of the configured roots.
pub struct PrefixWellKnownLocations {
    prefixes: Vec<PathBuf>,
}

impl PrefixWellKnownLocations {
    pub fn new(prefixes: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

impl WellKnownLocations for PrefixWellKnownLocations {
    fn is_well_known(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Routes classpath-entry snapshot lookups between the machine-scope global
/// cache and the build's local cache.
///
/// Content hashing alone is a poor locality signal: two unrelated builds can
/// produce byte-identical jars whose stability differs completely. Routing
/// on the entry's on-disk location keeps transient build outputs out of the
/// shared store while still sharing snapshots of genuinely stable
/// dependencies. The router forwards to exactly one side per call and owns
/// neither backing cache's lifecycle.
///
/// Callers must classify consistently: querying the same logical entry under
/// locations that classify differently silently halves the hit rate, and the
/// router makes no attempt to detect it.
pub struct SplitClasspathEntrySnapshotCache {
    locations: Arc<dyn WellKnownLocations>,
    global: ClasspathEntrySnapshotCache,
    local: ClasspathEntrySnapshotCache,
}

impl SplitClasspathEntrySnapshotCache {
    pub fn new(
        locations: Arc<dyn WellKnownLocations>,
        global: ClasspathEntrySnapshotCache,
        local: ClasspathEntrySnapshotCache,
    ) -> Self {
        Self {
            locations,
            global,
            local,
        }
    }

    /// Look up a snapshot, consulting the cache selected by `origin`.
    pub fn get(&self, key: &ContentKey, origin: &Path) -> Option<ClasspathEntrySnapshot> {
        self.select(origin).get(key)
    }

    /// Store a snapshot in the cache selected by `origin`.
    pub fn put(&self, key: ContentKey, origin: &Path, snapshot: &ClasspathEntrySnapshot) {
        self.select(origin).put(key, snapshot);
    }

    fn select(&self, origin: &Path) -> &ClasspathEntrySnapshotCache {
        if self.locations.is_well_known(origin) {
            &self.global
        } else {
            &self.local
        }
    }
}
