use crate::{read_or_miss, write_best_effort};
use javelin_cache::{ContentKey, InMemoryDecorator, IndexedStore, PersistentIndexedStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// On-disk table name for previous-compilation records.
pub(crate) const TASK_HISTORY_TABLE: &str = "task-history";

/// The compiler's state as of the end of a work unit's last successful
/// execution.
///
/// Unlike the content-addressed records, this is keyed by the stable
/// work-unit identifier: it answers "which work unit is this", not "what
/// content is this", and each successful compilation overwrites the record
/// for its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousCompilation {
    /// Source files compiled, relative to the work unit's base directory.
    pub compiled_sources: Vec<String>,
    /// Content keys of the classpath entries used, in classpath order.
    pub classpath_entry_keys: Vec<ContentKey>,
    /// Directory the compiled output was written to.
    pub destination: PathBuf,
}

pub(crate) type PreviousCompilationTable = InMemoryDecorator<
    String,
    PreviousCompilation,
    PersistentIndexedStore<String, PreviousCompilation>,
>;

/// Handle to the previous-compilation record of one work unit.
///
/// The backing table carries no in-memory layer: there is one record per
/// work unit per build, read at most once or twice, so retention would only
/// spend memory.
pub struct PreviousCompilationStore {
    work_unit: String,
    table: Arc<PreviousCompilationTable>,
}

impl PreviousCompilationStore {
    pub(crate) fn new(work_unit: String, table: Arc<PreviousCompilationTable>) -> Self {
        Self { work_unit, table }
    }

    pub fn work_unit(&self) -> &str {
        &self.work_unit
    }

    /// Fail-safe load of this work unit's record.
    pub fn load(&self) -> Option<PreviousCompilation> {
        read_or_miss(self.table.get(&self.work_unit), TASK_HISTORY_TABLE)
    }

    /// Replace this work unit's record unconditionally. There is no
    /// versioning or merge; the newest successful compilation wins.
    pub fn save(&self, record: &PreviousCompilation) {
        write_best_effort(self.table.put(&self.work_unit, record), TASK_HISTORY_TABLE);
    }
}
