use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache management and persistence.
///
/// Most read paths are fail-safe and degrade errors into cache misses; the
/// variants here surface where a caller needs to distinguish "the cache is
/// unusable" from "the entry is absent".
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default cache path")]
    MissingHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// A key or value failed to encode or decode.
    #[error("malformed cache data: {message}")]
    Format { message: String },

    /// The lock protecting a cache table could not be acquired within the
    /// configured retry budget.
    #[error("cache lock {} not acquired after {attempts} attempts", .path.display())]
    Unavailable { path: PathBuf, attempts: u32 },

    /// An operation required an open cache directory but found it in another
    /// lifecycle state.
    #[error("cache directory {} is {state}", .path.display())]
    Lifecycle { path: PathBuf, state: &'static str },
}
