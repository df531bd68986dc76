//! Render Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The external renderer could not produce an artifact.
    ///
    /// Render failures propagate to the caller and are never cached; the
    /// next request for the same key renders again.
    #[display("render failed: {_0}")]
    RenderFailed(#[error(not(source))] String),
    /// The cache layer failed underneath the render path.
    #[display("render cache error")]
    Cache,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache)
    }
}
