//! SQLite-backed persistence for the evidence core.
//!
//! Two shared, multi-writer structures live here, both backed by the same
//! [`Database`]:
//!
//! - **Render cache** ([`RenderCache`]): a versioned, size-bounded mapping
//!   from composite render keys to artifact files on disk, with the
//!   access-time bookkeeping LRU and TTL eviction need. The database is
//!   bookkeeping only; artifact bytes live in the [`ArtifactStore`] and are
//!   committed with atomic renames so no reader ever observes a partial
//!   write.
//! - **Block candidate index** ([`BlockIndex`]): a per-document catalog of
//!   sub-region semantics (title, discipline, keywords, system codes)
//!   extracted by an LLM, used to narrow which regions are worth rendering
//!   for a question. The catalog is advisory; consumers still verify claims
//!   against rendered artifacts.
//!
//! All mutating operations are safe under concurrent invocation without
//! external locking; serialization happens through SQLite upserts and
//! no-clobber artifact writes.

mod artifact;
mod cache;
mod db;
pub mod error;
mod index;
mod key;
mod models;

pub use crate::artifact::ArtifactStore;
pub use crate::cache::{CacheStats, RenderCache};
pub use crate::db::Database;
pub use crate::index::{BlockCrop, BlockIndex, Candidate, UpsertOutcome, extract_terms};
pub use crate::key::{BboxNorm, RenderKey};
pub use crate::models::{BlockIndexEntry, BlockStatus, CacheEntry, ExtractedFields};
