use crate::{read_or_miss, write_best_effort};
use javelin_cache::{
    BincodeSerializer, CacheDirectory, ContentKey, ContentKeySerializer, InMemoryDecorator,
    IndexedStore, MemoryPolicy, PersistentIndexedStore, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// On-disk table name for per-class analyses.
pub(crate) const CLASS_ANALYSIS_TABLE: &str = "class-analysis";

/// In-memory capacity for class-level entries. Class analyses are numerous
/// and individually small, so the hot layer is sized generously.
const CLASS_ANALYSIS_MEMORY_CAPACITY: usize = 400_000;

/// Structural facts extracted from one compiled class.
///
/// Produced by the class-file analyzer and stored verbatim; the cache does
/// not interpret the contents. A class file's content key fully determines
/// its analysis, so records are only ever inserted, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAnalysis {
    /// Binary name of the analyzed class (e.g. `com.example.Foo$Inner`).
    pub class_name: String,
    /// Classes this class depends on through its accessible (non-private)
    /// surface. Changes to these can require recompiling dependents.
    pub accessible_class_dependencies: BTreeSet<String>,
    /// Classes referenced only from private members.
    pub private_class_dependencies: BTreeSet<String>,
    /// Hashes of compile-time constants declared by this class. Constants
    /// are inlined into dependents, so their changes invalidate more widely
    /// than ordinary member changes.
    pub constant_hashes: BTreeSet<i64>,
}

type ClassAnalysisTable =
    InMemoryDecorator<ContentKey, ClassAnalysis, PersistentIndexedStore<ContentKey, ClassAnalysis>>;

/// Content-addressed cache of per-class analyses.
///
/// Keyed by the content key of the class file's bytes; the path the class
/// was found at is deliberately not part of the identity, so identical
/// classes reached through different entries share one analysis.
pub struct ClassAnalysisCache {
    store: ClassAnalysisTable,
}

impl ClassAnalysisCache {
    pub(crate) fn new(dir: &CacheDirectory) -> Result<Self> {
        let store = dir.create_store(
            CLASS_ANALYSIS_TABLE,
            Box::new(ContentKeySerializer),
            Box::new(BincodeSerializer::new()),
        )?;
        Ok(Self {
            store: InMemoryDecorator::new(
                store,
                MemoryPolicy::Bounded(CLASS_ANALYSIS_MEMORY_CAPACITY),
            ),
        })
    }

    /// Fail-safe lookup: any cache-level failure is a miss.
    pub fn get(&self, key: &ContentKey) -> Option<ClassAnalysis> {
        read_or_miss(self.store.get(key), CLASS_ANALYSIS_TABLE)
    }

    /// Best-effort insert; a failed write costs a future re-analysis, never
    /// the current build.
    pub fn put(&self, key: ContentKey, analysis: &ClassAnalysis) {
        write_best_effort(self.store.put(&key, analysis), CLASS_ANALYSIS_TABLE);
    }
}
