use crate::error::{Error, ErrorKind};
use crate::key::BboxNorm;
use drawbridge_budget::ResolutionTier;
use exn::ResultExt;
use std::path::PathBuf;
use time::UtcDateTime;

/// One rendered artifact tracked by the cache.
///
/// The composite key components are carried on the entry so eviction logging
/// and per-source invalidation don't need to re-derive them from the digest.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// BLAKE3 digest of the composite render key.
    pub key_digest: String,
    pub source_id: String,
    pub source_version: String,
    pub page: u32,
    pub tier: ResolutionTier,
    pub bbox: Option<BboxNorm>,
    /// Artifact path relative to the artifact store root.
    pub rel_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: UtcDateTime,
    /// Updated on every lookup; the LRU ordering criterion.
    pub last_access_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) key_digest: String,
    pub(crate) source_id: String,
    pub(crate) source_version: String,
    pub(crate) page: i64,
    pub(crate) tier: String,
    pub(crate) bbox: Option<String>,
    pub(crate) rel_path: String,
    pub(crate) size_bytes: i64,
    pub(crate) created_at: i64,
    pub(crate) last_access_at: i64,
}

impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key_digest: row.key_digest,
            source_id: row.source_id,
            source_version: row.source_version,
            page: u32::try_from(row.page).or_raise(|| ErrorKind::InvalidData("page number"))?,
            tier: row.tier.parse::<ResolutionTier>().or_raise(|| ErrorKind::InvalidData("resolution tier"))?,
            bbox: row.bbox.as_deref().map(str::parse::<BboxNorm>).transpose().or_raise(|| ErrorKind::InvalidData("bounding box"))?,
            rel_path: PathBuf::from(row.rel_path),
            size_bytes: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::InvalidData("artifact size"))?,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            last_access_at: UtcDateTime::from_unix_timestamp(row.last_access_at)
                .or_raise(|| ErrorKind::InvalidData("access date"))?,
        })
    }
}
