//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The extraction model failed to produce a usable answer.
    #[display("extraction failed: {_0}")]
    Extraction(#[error(not(source))] String),
    /// The model answered, but not in the expected schema.
    #[display("extraction schema violation: {_0}")]
    Schema(#[error(not(source))] String),
    /// The extraction service throttled us.
    ///
    /// Retryable after backoff; every other extraction failure counts
    /// against the block's attempt budget immediately.
    #[display("extraction rate limited")]
    RateLimited,
    /// Rendering the block's crop failed.
    #[display("crop render failed")]
    Render,
    /// The block index could not be read or written.
    #[display("block index error")]
    Index,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Index)
    }
}
