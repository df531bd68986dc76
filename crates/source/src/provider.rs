//! The upstream document provider trait.

use crate::error::Result;
use async_trait::async_trait;
use time::UtcDateTime;

/// Lightweight remote metadata for a source document.
///
/// Either field may be absent; a provider that can supply neither should
/// return `None` from [`SourceProvider::head`] so the resolver falls back to
/// content hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMeta {
    /// Opaque entity tag, as reported by the provider (e.g. an S3 ETag).
    pub etag: Option<String>,
    /// Last modification time, as reported by the provider.
    pub last_modified: Option<UtcDateTime>,
}

impl SourceMeta {
    /// Returns `true` if this metadata carries nothing usable for versioning.
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Read-only access to upstream source documents.
///
/// Implementations sit in front of whatever actually holds the documents
/// (object storage, a plain filesystem, an HTTP origin). The version resolver
/// is the primary consumer; renderers fetch full content through the same
/// trait.
///
/// # Examples
///
/// ```
/// use drawbridge_source::{SourceProvider, resolve_version};
/// use drawbridge_source::error::Result;
///
/// async fn current_version(provider: &dyn SourceProvider, reference: &str) -> Result<String> {
///     let token = resolve_version(provider, reference).await?;
///     Ok(token.to_string())
/// }
/// ```
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Human-readable provider name, used in logs only.
    fn name(&self) -> &str;

    /// Fetch lightweight metadata for a source without transferring content.
    ///
    /// Returns `Ok(None)` when the provider has no metadata channel for this
    /// reference (the resolver then falls back to hashing the content).
    /// Returns an error only when the provider could not be reached at all.
    async fn head(&self, reference: &str) -> Result<Option<SourceMeta>>;

    /// Fetch the full content of a source.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}
