//! Core shared definitions for Javelin.
//!
//! This crate is intentionally small and dependency-free.

/// The Javelin tool version.
///
/// Persisted cache envelopes record this version and treat a mismatch as a
/// cache miss, so artifacts written by one Javelin release are never decoded
/// by another.
pub const JAVELIN_VERSION: &str = env!("CARGO_PKG_VERSION");
