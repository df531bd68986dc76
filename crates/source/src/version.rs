//! Version token derivation for source documents.

use crate::error::{ErrorKind, Result};
use crate::provider::SourceProvider;
use derive_more::Display;
use exn::ResultExt;
use tracing::instrument;

/// Number of hex characters kept from a BLAKE3 content hash. 128 bits is
/// plenty of collision resistance for distinguishing document revisions.
const HASH_TOKEN_LEN: usize = 32;

/// A short, comparable token identifying the content state of a source
/// document at a point in time.
///
/// Two tokens compare equal exactly when they were derived from the same
/// observation of the source (same etag, same modification time, or same
/// content hash). Tokens are opaque to everything downstream; the cache and
/// the block index only ever compare them for equality.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// Token from a provider-supplied entity tag.
    pub fn from_etag(etag: impl AsRef<str>) -> Self {
        // Some providers wrap ETags in quotes; strip them so the same tag
        // observed through different client stacks yields the same token.
        let trimmed = etag.as_ref().trim().trim_matches('"');
        Self(format!("etag:{trimmed}"))
    }

    /// Token from a provider-supplied modification timestamp.
    pub fn from_mtime(unix_timestamp: i64) -> Self {
        Self(format!("mtime:{unix_timestamp}"))
    }

    /// Token from the full content bytes (BLAKE3, truncated hex).
    pub fn from_content(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes).to_hex();
        Self(format!("hash:{}", &digest.as_str()[..HASH_TOKEN_LEN]))
    }

    /// The token as a plain string slice, for storage in keyed records.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<VersionToken> for String {
    fn from(token: VersionToken) -> Self {
        token.0
    }
}

/// Resolve the current version of a source document.
///
/// Attempts the cheap path first: provider metadata (etag, then
/// last-modified). If the provider has no metadata for the reference, the
/// full content is fetched and hashed. A metadata *failure* (as opposed to
/// absence) also falls through to the content fetch, since a provider may
/// support one channel but not the other.
///
/// # Errors
///
/// [`ErrorKind::Unavailable`] when neither metadata nor content could be
/// retrieved. Callers must abort whatever depended on the version; the stale
/// previous token must never be substituted.
#[instrument(skip(provider), fields(provider = provider.name()))]
pub async fn resolve_version(provider: &dyn SourceProvider, reference: &str) -> Result<VersionToken> {
    match provider.head(reference).await {
        Ok(Some(meta)) => {
            if let Some(etag) = &meta.etag
                && !etag.trim().is_empty()
            {
                return Ok(VersionToken::from_etag(etag));
            }
            if let Some(mtime) = meta.last_modified {
                return Ok(VersionToken::from_mtime(mtime.unix_timestamp()));
            }
            // Metadata present but empty: treat the same as absent.
        },
        Ok(None) => {},
        Err(err) => {
            tracing::debug!(reference, error = %err, "metadata lookup failed; falling back to content hash");
        },
    }
    let content = provider
        .fetch(reference)
        .await
        .or_raise(|| ErrorKind::Unavailable(reference.to_string()))?;
    Ok(VersionToken::from_content(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_tokens_strip_quotes() {
        assert_eq!(VersionToken::from_etag("\"abc123\""), VersionToken::from_etag("abc123"));
    }

    #[test]
    fn identical_content_identical_token() {
        let a = VersionToken::from_content(b"drawing revision 4");
        let b = VersionToken::from_content(b"drawing revision 4");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_content_differing_token() {
        let a = VersionToken::from_content(b"drawing revision 4");
        let b = VersionToken::from_content(b"drawing revision 5");
        assert_ne!(a, b);
    }

    #[test]
    fn token_kinds_never_collide() {
        // An etag that happens to look like a hash must not equal the hash token.
        let content = b"payload";
        let hash = VersionToken::from_content(content);
        let spoofed = VersionToken::from_etag(hash.as_str().trim_start_matches("hash:"));
        assert_ne!(hash, spoofed);
    }
}
