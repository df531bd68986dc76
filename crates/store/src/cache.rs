//! Render cache repository: durable key → artifact bookkeeping plus the
//! LRU/TTL eviction passes.

use crate::artifact::ArtifactStore;
use crate::db::Database;
use crate::error::{ErrorKind, Result};
use crate::key::RenderKey;
use crate::models::{CacheEntry, EntryRow};
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

/// Aggregate cache statistics, for operator visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
    pub oldest_created_at: Option<UtcDateTime>,
    pub newest_created_at: Option<UtcDateTime>,
}

/// Repository for render cache entries.
///
/// Pairs the bookkeeping table with the on-disk [`ArtifactStore`]. All
/// operations are safe under concurrent invocation: recency updates are a
/// single atomic `UPDATE ... RETURNING`, inserts race through no-clobber
/// artifact writes plus `ON CONFLICT DO NOTHING`, and eviction tolerates
/// losing races for the artifact file.
///
/// Rendering failures are never cached; only successfully produced
/// artifacts enter the store.
#[derive(Debug, Clone)]
pub struct RenderCache {
    pool: SqlitePool,
    artifacts: ArtifactStore,
}

impl RenderCache {
    /// Create a repository over an open database and artifact store.
    pub fn new(db: &Database, artifacts: ArtifactStore) -> Self {
        Self { pool: db.pool().clone(), artifacts }
    }

    /// The underlying artifact store.
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Look up an entry, updating its last-access timestamp.
    ///
    /// The recency touch makes this a mutating operation; doing it in one
    /// `UPDATE ... RETURNING` statement keeps it atomic with respect to a
    /// concurrent eviction pass (the pass either sees the new timestamp or
    /// has already removed the row — never a half-updated state).
    ///
    /// A bookkeeping row whose artifact has vanished from disk is treated as
    /// a miss and cleaned up.
    #[instrument(skip(self), fields(key = %key.digest()))]
    pub async fn lookup(&self, key: &RenderKey) -> Result<Option<CacheEntry>> {
        let digest = key.digest();
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/touch_entry.sql"))
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(&digest)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let entry = CacheEntry::try_from(row)?;
        if !self.artifacts.exists(&entry.rel_path) {
            tracing::warn!(key = %digest, "artifact missing for cache row; treating as miss");
            self.delete_row(&digest).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Read the artifact bytes for a looked-up entry.
    pub fn read(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        self.artifacts.read(&entry.rel_path)
    }

    /// Register a newly rendered artifact.
    ///
    /// Idempotent under concurrent renders of the same key: the artifact is
    /// committed with an atomic no-clobber rename, so exactly one payload
    /// wins; later writers discard their bytes and adopt the incumbent. Both
    /// callers receive an entry describing the artifact that is actually on
    /// disk.
    #[instrument(skip(self, bytes), fields(key = %key.digest(), size = bytes.len()))]
    pub async fn insert(&self, key: &RenderKey, bytes: &[u8]) -> Result<CacheEntry> {
        let digest = key.digest();
        let outcome = self.artifacts.write_new(&digest, bytes)?;
        // The losing payload may differ in size from the winner (same key,
        // nondeterministic renderer); bookkeeping must describe the bytes on
        // disk, not the bytes we happened to render.
        let size = self.artifacts.size(outcome.rel_path())?;
        let now = UtcDateTime::now().unix_timestamp();
        let rel_path =
            outcome.rel_path().to_str().ok_or_raise(|| ErrorKind::InvalidData("artifact path"))?.to_string();
        sqlx::query(include_str!("../queries/insert_entry.sql"))
            .bind(&digest)
            .bind(&key.source_id)
            .bind(&key.source_version)
            .bind(i64::from(key.page))
            .bind(key.tier.to_string())
            .bind(key.bbox.as_ref().map(|b| b.canonical()))
            .bind(&rel_path)
            .bind(i64::try_from(size).or_raise(|| ErrorKind::InvalidData("artifact size"))?)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let row: EntryRow = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(&digest)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_into()
    }

    /// Remove an entry and its artifact.
    ///
    /// Best-effort on the artifact side: a file already deleted by a
    /// concurrent pass (or by hand) is logged and ignored, never escalated.
    #[instrument(skip(self, entry), fields(key = %entry.key_digest))]
    pub async fn evict(&self, entry: &CacheEntry) -> Result<()> {
        self.delete_row(&entry.key_digest).await?;
        match self.artifacts.remove(&entry.rel_path) {
            Ok(true) => {},
            Ok(false) => tracing::debug!(path = %entry.rel_path.display(), "artifact already gone"),
            Err(err) => tracing::warn!(path = %entry.rel_path.display(), error = %err, "failed to delete artifact"),
        }
        Ok(())
    }

    /// Evict least-recently-used entries until total size fits the budget.
    ///
    /// Victim order: oldest last-access, then oldest creation, then key
    /// digest. The digest tiebreak makes the pass deterministic under test
    /// and guarantees termination.
    #[instrument(skip(self))]
    pub async fn enforce_budget(&self, max_bytes: u64) -> Result<u64> {
        let mut total = self.total_bytes().await?;
        let mut evicted = 0;
        while total > max_bytes {
            let victim: Option<EntryRow> = sqlx::query_as(include_str!("../queries/lru_victim.sql"))
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let Some(victim) = victim else {
                break;
            };
            let victim = CacheEntry::try_from(victim)?;
            tracing::debug!(key = %victim.key_digest, size = victim.size_bytes, "evicting LRU entry");
            self.evict(&victim).await?;
            total = total.saturating_sub(victim.size_bytes);
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Evict every entry whose last access is older than `max_age`.
    ///
    /// Independent of the size budget; the two passes may run on different
    /// schedules and compose in either order (both only remove entries).
    #[instrument(skip(self))]
    pub async fn enforce_ttl(&self, max_age: time::Duration) -> Result<u64> {
        let cutoff = (UtcDateTime::now() - max_age).unix_timestamp();
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/expired_entries.sql"))
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut evicted = 0;
        for row in rows {
            self.evict(&row.try_into()?).await?;
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Remove every entry for one source, across all versions.
    ///
    /// Operator-facing. The automatic lifecycle never calls this: entries
    /// orphaned by a version change wait for ordinary LRU/TTL reclaim.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, source_id: &str) -> Result<u64> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/entries_for_source.sql"))
            .bind(source_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut removed = 0;
        for row in rows {
            self.evict(&row.try_into()?).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Total bytes currently tracked by the cache.
    pub async fn total_bytes(&self) -> Result<u64> {
        let (total,): (i64,) = sqlx::query_as(include_str!("../queries/total_bytes.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(total).or_raise(|| ErrorKind::InvalidData("total size"))
    }

    /// Aggregate statistics.
    pub async fn stats(&self) -> Result<CacheStats> {
        let (entries, total_bytes, oldest, newest): (i64, i64, Option<i64>, Option<i64>) =
            sqlx::query_as(include_str!("../queries/cache_stats.sql"))
                .fetch_one(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        Ok(CacheStats {
            entries: u64::try_from(entries).or_raise(|| ErrorKind::InvalidData("entry count"))?,
            total_bytes: u64::try_from(total_bytes).or_raise(|| ErrorKind::InvalidData("total size"))?,
            oldest_created_at: oldest
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            newest_created_at: newest
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
        })
    }

    async fn delete_row(&self, digest: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(digest)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
