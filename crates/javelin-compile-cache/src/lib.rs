//! The compile-specific cache tier: three named key→value spaces used by
//! incremental recompilation, built on `javelin-cache`.
//!
//! - `class-analysis`: content key of one class file → structural analysis
//!   of that class. Content-addressed, immutable once written.
//! - `classpath-snapshots`: content key of one classpath entry (jar or class
//!   directory) → aggregated snapshot of every class inside it.
//!   Content-addressed, immutable once written, and routed between a
//!   machine-scope global cache and the build's local cache based on where
//!   the entry lives on disk.
//! - `task-history`: work-unit identifier → the compiler's state as of that
//!   unit's last successful execution. Identity-keyed and overwritten on
//!   every successful compilation.
//!
//! All three spaces are pure optimizations: every read path degrades cache
//! trouble into a miss, so a broken or unavailable cache can slow a build
//! down but never change its output.

mod analysis;
mod caches;
mod previous;
mod snapshot;

pub use analysis::{ClassAnalysis, ClassAnalysisCache};
pub use caches::{CompileCaches, GlobalCompileCaches};
pub use previous::{PreviousCompilation, PreviousCompilationStore};
pub use snapshot::{
    ClassSetAnalysis, ClasspathEntrySnapshot, ClasspathEntrySnapshotCache,
    PrefixWellKnownLocations, SplitClasspathEntrySnapshotCache, WellKnownLocations,
};

/// Degrade a cache-level read failure into a miss.
///
/// The cache's complete absence must never change build correctness, so
/// every sub-cache read funnels through here.
pub(crate) fn read_or_miss<T>(
    result: javelin_cache::Result<Option<T>>,
    table: &'static str,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(
                target = "javelin.compile",
                table,
                error = %err,
                "cache read failed; treating as miss"
            );
            None
        }
    }
}

/// Log and drop a cache-level write failure.
///
/// A failed write only costs a future recomputation; it must not fail the
/// compilation that produced the value.
pub(crate) fn write_best_effort(result: javelin_cache::Result<()>, table: &'static str) {
    if let Err(err) = result {
        tracing::debug!(
            target = "javelin.compile",
            table,
            error = %err,
            "cache write failed; entry dropped"
        );
    }
}
