use crate::analysis::ClassAnalysisCache;
use crate::previous::{PreviousCompilationStore, PreviousCompilationTable, TASK_HISTORY_TABLE};
use crate::snapshot::{
    ClasspathEntrySnapshotCache, SplitClasspathEntrySnapshotCache, WellKnownLocations,
};
use javelin_cache::{
    BincodeSerializer, CacheConfig, CacheDirectory, InMemoryDecorator, MemoryPolicy, Result,
    StringSerializer,
};
use std::path::Path;
use std::sync::Arc;

/// Domain directory under the shared cache root for machine-scope snapshots
/// of well-known classpath entries.
const GLOBAL_CACHE_DOMAIN: &str = "deps-analysis";

/// Domain directory under a build's cache root for its own compile caches.
const LOCAL_CACHE_DOMAIN: &str = "compile";

/// Machine-scope compile caches shared across build invocations.
///
/// Holds the global side of the classpath-snapshot split: snapshots of
/// entries in well-known locations (shared dependency repositories), reused
/// verbatim by unrelated builds. Long-lived relative to any single build;
/// typically opened once per daemon or user session.
pub struct GlobalCompileCaches {
    dir: CacheDirectory,
    classpath_snapshots: ClasspathEntrySnapshotCache,
}

impl GlobalCompileCaches {
    /// Open (or create) the machine-scope cache directory under the shared
    /// cache root.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let dir = CacheDirectory::new(
            config.cache_root()?.join(GLOBAL_CACHE_DOMAIN),
            "dependency analysis cache",
        );
        dir.open()?;
        let classpath_snapshots = ClasspathEntrySnapshotCache::new(&dir)?;
        Ok(Self {
            dir,
            classpath_snapshots,
        })
    }

    /// The global classpath-snapshot cache, shared with split routers.
    pub fn classpath_entry_snapshot_cache(&self) -> ClasspathEntrySnapshotCache {
        self.classpath_snapshots.clone()
    }

    pub fn close(&self) {
        self.dir.close();
    }
}

/// The per-build compile caches: one local cache directory per build
/// invocation, plus routing into the machine-scope caches.
///
/// Construction opens the directory and wires all three named sub-caches
/// with their serializers and retention policies; `close()` ends the scope
/// deterministically and is idempotent. The global caches are borrowed, not
/// owned: closing a build's caches never touches the machine-scope
/// directory.
pub struct CompileCaches {
    dir: CacheDirectory,
    class_analysis: ClassAnalysisCache,
    classpath_snapshots: SplitClasspathEntrySnapshotCache,
    previous_compilations: Arc<PreviousCompilationTable>,
}

impl CompileCaches {
    /// Open the build-local compile cache under `build_cache_root` and wire
    /// the sub-caches.
    ///
    /// Directory open failure is the one cache error that propagates: with
    /// no directory there is nothing to degrade to, and the embedder decides
    /// whether to run the build uncached.
    pub fn open(
        build_cache_root: impl AsRef<Path>,
        global: &GlobalCompileCaches,
        locations: Arc<dyn WellKnownLocations>,
    ) -> Result<Self> {
        let dir = CacheDirectory::new(
            build_cache_root.as_ref().join(LOCAL_CACHE_DOMAIN),
            "compile cache",
        );
        dir.open()?;

        let class_analysis = ClassAnalysisCache::new(&dir)?;
        let local_snapshots = ClasspathEntrySnapshotCache::new(&dir)?;
        let classpath_snapshots = SplitClasspathEntrySnapshotCache::new(
            locations,
            global.classpath_entry_snapshot_cache(),
            local_snapshots,
        );

        let previous_compilations = dir.create_store(
            TASK_HISTORY_TABLE,
            Box::new(StringSerializer),
            Box::new(BincodeSerializer::new()),
        )?;
        let previous_compilations = Arc::new(InMemoryDecorator::new(
            previous_compilations,
            MemoryPolicy::Disabled,
        ));

        Ok(Self {
            dir,
            class_analysis,
            classpath_snapshots,
            previous_compilations,
        })
    }

    pub fn class_analysis_cache(&self) -> &ClassAnalysisCache {
        &self.class_analysis
    }

    pub fn classpath_entry_snapshot_cache(&self) -> &SplitClasspathEntrySnapshotCache {
        &self.classpath_snapshots
    }

    /// A handle onto the previous-compilation record of one work unit.
    pub fn previous_compilation_store(
        &self,
        work_unit: impl Into<String>,
    ) -> PreviousCompilationStore {
        PreviousCompilationStore::new(work_unit.into(), self.previous_compilations.clone())
    }

    /// End this build's cache scope. Idempotent; the global caches are left
    /// untouched.
    pub fn close(&self) {
        self.dir.close();
    }
}
