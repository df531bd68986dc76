//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Reading or writing an artifact file failed.
    #[display("artifact I/O error: {}", _0.display())]
    Artifact(#[error(not(source))] PathBuf),
    /// The artifact for a bookkeeping record is gone from disk.
    #[display("artifact missing: {}", _0.display())]
    ArtifactMissing(#[error(not(source))] PathBuf),
    /// A block operation referenced a block that was never registered.
    #[display("unknown block: ({_0}, {_1})")]
    BlockNotFound(String, String),
    /// An extraction payload failed schema validation. Treated by callers
    /// exactly like an extraction failure.
    #[display("invalid extraction payload: {_0}")]
    Schema(#[error(not(source))] String),
    /// Conversion between database rows and models failed.
    #[display("invalid {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY surfaces as a database error and a retry can win the
        // lock; everything else here is deterministic.
        matches!(self, Self::Database)
    }
}
