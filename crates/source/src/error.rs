//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Neither metadata nor content could be retrieved for a source.
    ///
    /// Callers depending on version resolution must abort the dependent
    /// operation; substituting a stale version is never correct.
    #[display("source unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// The reference string does not name anything the provider understands.
    #[display("invalid source reference: {_0}")]
    InvalidReference(#[error(not(source))] String),
    /// Underlying transport/I/O failure talking to the provider.
    #[display("provider I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io)
    }
}
