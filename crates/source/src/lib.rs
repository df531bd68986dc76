//! Source document provider boundary and version resolution.
//!
//! Upstream documents (PDFs in object storage, remote URLs) are reached only
//! through the [`SourceProvider`] trait. The crate's real job is the version
//! resolver: deriving a short, comparable [`VersionToken`] for the current
//! content state of a source, so that everything derived from that source
//! (page renders, ROI crops, block metadata) can be invalidated when the
//! source changes.
//!
//! Token derivation is cheapest-first: a provider-supplied entity tag, then a
//! last-modified timestamp, and only as a last resort a BLAKE3 hash of the
//! full content.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod provider;
mod version;

#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockProvider;
pub use crate::provider::{SourceMeta, SourceProvider};
pub use crate::version::{VersionToken, resolve_version};
