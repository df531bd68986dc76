//! Block candidate index: per-document catalog of extracted sub-region
//! semantics, plus the lexical candidate search over it.

use crate::db::Database;
use crate::error::{ErrorKind, Result};
use crate::key::BboxNorm;
use crate::models::{BlockIndexEntry, BlockRow, BlockStatus, ExtractedFields};
use async_stream::stream;
use exn::{OptionExt, ResultExt};
use futures::Stream;
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::LazyLock;
use time::UtcDateTime;
use tracing::instrument;

static TERM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Minimum description length before a block's score takes the
/// thin-content penalty.
const THIN_DESCRIPTION_CHARS: usize = 20;
const THIN_DESCRIPTION_PENALTY: f64 = 0.5;

/// Split a free-text question into lowercase search terms.
///
/// Single-character fragments carry no signal and are dropped; duplicates
/// keep their first position.
pub fn extract_terms(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for found in TERM_REGEX.find_iter(&lowered) {
        let term = found.as_str();
        if term.chars().count() >= 2 && !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Where a block's rendered crop comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCrop {
    /// Source reference the crop renders from.
    pub crop_ref: String,
    pub page: u32,
    pub bbox: Option<BboxNorm>,
}

/// What an upsert did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First successful extraction for this block.
    Inserted,
    /// An earlier record was replaced in full.
    Replaced,
    /// An identical extraction (same source and prompt versions) already
    /// exists; nothing was written.
    Skipped,
}

/// One block matched by a candidate search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: BlockIndexEntry,
    /// Lexical relevance of the query terms against the block's fields.
    pub score: f64,
    /// System codes shared by the query and the block, normalized.
    pub matched_codes: Vec<String>,
}

/// Repository for the per-document block catalog.
///
/// Writes are idempotent and safe under concurrent invocation: registration
/// and upserts serialize through SQLite conflict clauses, and a re-index
/// that would write exactly what is already there is skipped without
/// touching the row.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pool: SqlitePool,
}

impl BlockIndex {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }

    /// Register a block discovered by layout segmentation, in `pending`
    /// state with no extracted fields. Returns `false` if the block was
    /// already known (the existing record, including any extracted fields,
    /// is left untouched).
    #[instrument(skip(self, crop))]
    pub async fn register_block(
        &self,
        document_id: &str,
        block_id: &str,
        crop: &BlockCrop,
        source_version: &str,
    ) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/register_block.sql"))
            .bind(document_id)
            .bind(block_id)
            .bind(&crop.crop_ref)
            .bind(i64::from(crop.page))
            .bind(crop.bbox.as_ref().map(BboxNorm::canonical))
            .bind(source_version)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful extraction for a block.
    ///
    /// The record is replaced in full: fields from an older extraction never
    /// leak through, the attempt counter resets, and the status returns to
    /// `indexed`. When an indexed record for the same source and prompt
    /// versions already exists the write is skipped, leaving `indexed_at`
    /// untouched — two workers racing to re-index the same block converge
    /// without churning the row.
    #[instrument(skip(self, crop, fields))]
    pub async fn upsert_block(
        &self,
        document_id: &str,
        block_id: &str,
        crop: &BlockCrop,
        source_version: &str,
        prompt_version: &str,
        model_id: &str,
        fields: &ExtractedFields,
    ) -> Result<UpsertOutcome> {
        fields.validate()?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let existing: Option<BlockRow> = sqlx::query_as(include_str!("../queries/get_block.sql"))
            .bind(document_id)
            .bind(block_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let outcome = match &existing {
            Some(row)
                if row.status == BlockStatus::Indexed.to_string()
                    && row.source_version == source_version
                    && row.prompt_version.as_deref() == Some(prompt_version) =>
            {
                tx.commit().await.or_raise(|| ErrorKind::Database)?;
                return Ok(UpsertOutcome::Skipped);
            },
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        sqlx::query(include_str!("../queries/upsert_block.sql"))
            .bind(document_id)
            .bind(block_id)
            .bind(&crop.crop_ref)
            .bind(i64::from(crop.page))
            .bind(crop.bbox.as_ref().map(BboxNorm::canonical))
            .bind(source_version)
            .bind(prompt_version)
            .bind(model_id)
            .bind(&fields.title)
            .bind(&fields.discipline)
            .bind(serde_json::to_string(&fields.keywords).or_raise(|| ErrorKind::InvalidData("keywords"))?)
            .bind(&fields.description)
            .bind(fields.floor.as_deref())
            .bind(fields.scale.as_deref())
            .bind(serde_json::to_string(&fields.system_codes).or_raise(|| ErrorKind::InvalidData("system codes"))?)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(outcome)
    }

    /// Record a failed extraction attempt, preserving any last-known-good
    /// fields. Returns the new attempt count.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, document_id: &str, block_id: &str, error: &str) -> Result<u32> {
        let attempts: Option<(i64,)> = sqlx::query_as(include_str!("../queries/mark_failed.sql"))
            .bind(document_id)
            .bind(block_id)
            .bind(error)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let (attempts,) = attempts
            .ok_or_raise(|| ErrorKind::BlockNotFound(document_id.to_string(), block_id.to_string()))?;
        u32::try_from(attempts).or_raise(|| ErrorKind::InvalidData("attempt counter"))
    }

    /// Fetch a single block record.
    pub async fn get(&self, document_id: &str, block_id: &str) -> Result<Option<BlockIndexEntry>> {
        let row: Option<BlockRow> = sqlx::query_as(include_str!("../queries/get_block.sql"))
            .bind(document_id)
            .bind(block_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Search a document's indexed blocks for candidates worth rendering.
    ///
    /// Two passes over the catalog, exact before fuzzy:
    ///
    /// 1. blocks sharing a system code with the query, ordered by how many
    ///    codes match;
    /// 2. blocks with a positive lexical score against the query terms,
    ///    ordered by score.
    ///
    /// Ties break on block id, so the ordering is stable across runs. The
    /// stream is lazy past the initial fetch; a consumer that has seen
    /// enough can drop it early.
    pub fn find_candidates(
        &self,
        document_id: &str,
        query_terms: &[String],
        system_codes: &[String],
        limit: usize,
    ) -> impl Stream<Item = Result<Candidate>> + 'static {
        let pool = self.pool.clone();
        let document_id = document_id.to_string();
        let terms: Vec<String> = query_terms.iter().map(|t| t.to_lowercase()).collect();
        let codes: Vec<String> = system_codes.iter().map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()).collect();
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let rows: Vec<BlockRow> = match sqlx::query_as(include_str!("../queries/indexed_blocks.sql"))
                .bind(&document_id)
                .fetch_all(&pool)
                .await
                .or_raise(|| ErrorKind::Database)
            {
                Ok(rows) => rows,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let mut exact: Vec<Candidate> = Vec::new();
            let mut fuzzy: Vec<Candidate> = Vec::new();
            for row in rows {
                let entry: BlockIndexEntry = match row.try_into() {
                    Ok(entry) => entry,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                let Some(fields) = &entry.fields else {
                    continue;
                };
                let matched_codes: Vec<String> =
                    fields.normalized_codes().into_iter().filter(|c| codes.contains(c)).collect();
                let score = relevance(fields, &terms);
                if !matched_codes.is_empty() {
                    exact.push(Candidate { entry, score, matched_codes });
                } else if score > 0.0 {
                    fuzzy.push(Candidate { entry, score, matched_codes });
                }
            }
            exact.sort_by(|a, b| {
                b.matched_codes.len().cmp(&a.matched_codes.len()).then_with(|| a.entry.block_id.cmp(&b.entry.block_id))
            });
            fuzzy.sort_by(|a, b| {
                b.score.total_cmp(&a.score).then_with(|| a.entry.block_id.cmp(&b.entry.block_id))
            });
            for candidate in exact.into_iter().chain(fuzzy).take(limit) {
                yield Ok(candidate);
            }
        })
    }

    /// Blocks awaiting (re-)extraction: pending, or failed with attempts
    /// left in the budget.
    pub async fn pending_blocks(&self, document_id: &str, max_attempts: u32) -> Result<Vec<BlockIndexEntry>> {
        let rows: Vec<BlockRow> = sqlx::query_as(include_str!("../queries/pending_blocks.sql"))
            .bind(document_id)
            .bind(i64::from(max_attempts))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Indexed blocks whose extraction predates the current source or
    /// prompt version. Stale blocks keep serving candidates; this list
    /// feeds the background refresh.
    pub async fn stale_blocks(
        &self,
        document_id: &str,
        current_source_version: &str,
        current_prompt_version: &str,
    ) -> Result<Vec<BlockIndexEntry>> {
        let rows: Vec<BlockRow> = sqlx::query_as(include_str!("../queries/stale_blocks.sql"))
            .bind(document_id)
            .bind(current_source_version)
            .bind(current_prompt_version)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Drop every block record for a document. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_document_blocks.sql"))
            .bind(document_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

/// Lexical score of a block against lowercased query terms: one point per
/// term found in the title, keywords, or description, minus a penalty for
/// descriptions too short to trust.
fn relevance(fields: &ExtractedFields, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack =
        format!("{} {} {}", fields.title, fields.keywords.join(" "), fields.description).to_lowercase();
    let mut score = terms.iter().filter(|term| haystack.contains(term.as_str())).count() as f64;
    if score > 0.0 && fields.description.chars().count() < THIN_DESCRIPTION_CHARS {
        score -= THIN_DESCRIPTION_PENALTY;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rstest::rstest;

    async fn index() -> BlockIndex {
        BlockIndex::new(&Database::connect_in_memory().await.unwrap())
    }

    fn crop(page: u32) -> BlockCrop {
        BlockCrop { crop_ref: "drawings/plan.pdf".to_string(), page, bbox: None }
    }

    fn fields(title: &str, keywords: &[&str], description: &str, codes: &[&str]) -> ExtractedFields {
        ExtractedFields {
            title: title.to_string(),
            discipline: "HVAC".to_string(),
            keywords: keywords.iter().map(ToString::to_string).collect(),
            description: description.to_string(),
            floor: None,
            scale: None,
            system_codes: codes.iter().map(ToString::to_string).collect(),
        }
    }

    #[rstest]
    #[case("Where is the B2 exhaust fan?", &["where", "is", "the", "b2", "exhaust", "fan"])]
    #[case("fan FAN fan", &["fan"])]
    #[case("a b c", &[])]
    fn terms_are_lowercased_and_deduped(#[case] query: &str, #[case] expected: &[&str]) {
        assert_eq!(extract_terms(query), expected);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let index = index().await;
        assert!(index.register_block("doc", "B-001", &crop(1), "v1").await.unwrap());
        assert!(!index.register_block("doc", "B-001", &crop(1), "v1").await.unwrap());
        let entry = index.get("doc", "B-001").await.unwrap().unwrap();
        assert_eq!(entry.status, BlockStatus::Pending);
        assert!(entry.fields.is_none());
    }

    #[tokio::test]
    async fn upsert_inserts_then_skips_identical_reindex() {
        let index = index().await;
        let f = fields("Pump schedule", &["pump"], "Schedule of circulation pumps.", &[]);
        let outcome = index.upsert_block("doc", "B-001", &crop(1), "v1", "p1", "m1", &f).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        // Backdate so an accidental rewrite would be visible.
        sqlx::query("UPDATE block_index SET indexed_at = 1000000 WHERE block_id = 'B-001'")
            .execute(&index.pool)
            .await
            .unwrap();
        let outcome = index.upsert_block("doc", "B-001", &crop(1), "v1", "p1", "m1", &f).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);
        let entry = index.get("doc", "B-001").await.unwrap().unwrap();
        assert_eq!(entry.indexed_at.unwrap().unix_timestamp(), 1_000_000);
    }

    #[tokio::test]
    async fn changed_prompt_version_replaces_in_full() {
        let index = index().await;
        let old = fields("Old title", &["old"], "Old description, long enough.", &["B2"]);
        index.upsert_block("doc", "B-001", &crop(1), "v1", "p1", "m1", &old).await.unwrap();
        index.mark_failed("doc", "B-001", "transient").await.unwrap();
        let new = fields("New title", &["new"], "New description, long enough.", &[]);
        let outcome = index.upsert_block("doc", "B-001", &crop(2), "v1", "p2", "m1", &new).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Replaced);
        let entry = index.get("doc", "B-001").await.unwrap().unwrap();
        assert_eq!(entry.status, BlockStatus::Indexed);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.last_error, None);
        assert_eq!(entry.page, 2);
        let f = entry.fields.unwrap();
        // No field from the old extraction leaks through.
        assert_eq!(f.title, "New title");
        assert!(f.system_codes.is_empty());
    }

    #[tokio::test]
    async fn failure_preserves_last_known_good_fields() {
        let index = index().await;
        let f = fields("Riser diagram", &["riser"], "Supply air riser, levels 1-4.", &[]);
        index.upsert_block("doc", "B-001", &crop(1), "v1", "p1", "m1", &f).await.unwrap();
        assert_eq!(index.mark_failed("doc", "B-001", "model timeout").await.unwrap(), 1);
        assert_eq!(index.mark_failed("doc", "B-001", "model timeout").await.unwrap(), 2);
        let entry = index.get("doc", "B-001").await.unwrap().unwrap();
        assert_eq!(entry.status, BlockStatus::Failed);
        assert_eq!(entry.last_error.as_deref(), Some("model timeout"));
        assert_eq!(entry.fields.unwrap().title, "Riser diagram");
    }

    #[tokio::test]
    async fn mark_failed_on_unknown_block_is_an_error() {
        let index = index().await;
        let err = index.mark_failed("doc", "nope", "x").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BlockNotFound(_, _)));
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_the_index() {
        let index = index().await;
        let bad = fields("  ", &["k"], "description long enough here", &[]);
        let err = index.upsert_block("doc", "B-001", &crop(1), "v1", "p1", "m1", &bad).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Schema(_)));
        assert!(index.get("doc", "B-001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn code_match_is_exact_not_prefix() {
        let index = index().await;
        let a = fields("Sanitary plan", &["sanitary"], "Sanitary drainage, ground floor.", &["B2"]);
        let b = fields("Heat recovery", &["heat"], "Heat recovery ventilation unit.", &["B21"]);
        index.upsert_block("doc", "A", &crop(1), "v1", "p1", "m1", &a).await.unwrap();
        index.upsert_block("doc", "B", &crop(2), "v1", "p1", "m1", &b).await.unwrap();
        let hits: Vec<_> = index
            .find_candidates("doc", &[], &["B2".to_string()], 10)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.block_id, "A");
        assert_eq!(hits[0].matched_codes, ["B2"]);
    }

    #[tokio::test]
    async fn code_matches_rank_ahead_of_lexical_matches() {
        let index = index().await;
        let lexical = fields("Exhaust fan detail", &["exhaust", "fan"], "Roof exhaust fan mounting detail.", &[]);
        let coded = fields("Unrelated title", &["other"], "Nothing lexical in common here.", &["K11"]);
        index.upsert_block("doc", "A", &crop(1), "v1", "p1", "m1", &lexical).await.unwrap();
        index.upsert_block("doc", "B", &crop(2), "v1", "p1", "m1", &coded).await.unwrap();
        let terms = extract_terms("exhaust fan");
        let hits: Vec<_> = index
            .find_candidates("doc", &terms, &["k11".to_string()], 10)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.entry.block_id.as_str()).collect();
        assert_eq!(ids, ["B", "A"]);
    }

    #[tokio::test]
    async fn lexical_ranking_orders_by_score_and_penalizes_thin_descriptions() {
        let index = index().await;
        let strong = fields("Exhaust fan schedule", &["exhaust", "fan"], "Schedule of roof exhaust fans.", &[]);
        let weak = fields("Fan", &["fan"], "Fan.", &[]);
        let miss = fields("Lighting plan", &["lighting"], "Luminaire layout, first floor.", &[]);
        index.upsert_block("doc", "A", &crop(1), "v1", "p1", "m1", &weak).await.unwrap();
        index.upsert_block("doc", "B", &crop(2), "v1", "p1", "m1", &strong).await.unwrap();
        index.upsert_block("doc", "C", &crop(3), "v1", "p1", "m1", &miss).await.unwrap();
        let terms = extract_terms("exhaust fan");
        let hits: Vec<_> = index
            .find_candidates("doc", &terms, &[], 10)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.entry.block_id.as_str()).collect();
        assert_eq!(ids, ["B", "A"], "zero-score blocks are excluded");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn consumer_can_abandon_the_stream_early() {
        let index = index().await;
        for id in ["A", "B", "C"] {
            let f = fields("Fan detail", &["fan"], "Exhaust fan mounting detail.", &[]);
            index.upsert_block("doc", id, &crop(1), "v1", "p1", "m1", &f).await.unwrap();
        }
        let terms = extract_terms("fan");
        let first: Vec<_> = index.find_candidates("doc", &terms, &[], 10).take(1).collect().await;
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn pending_includes_failed_blocks_with_attempts_left() {
        let index = index().await;
        index.register_block("doc", "P", &crop(1), "v1").await.unwrap();
        let f = fields("Title", &["k"], "Long enough description here.", &[]);
        index.upsert_block("doc", "F", &crop(2), "v1", "p1", "m1", &f).await.unwrap();
        index.upsert_block("doc", "X", &crop(3), "v1", "p1", "m1", &f).await.unwrap();
        for _ in 0..3 {
            index.mark_failed("doc", "F", "boom").await.unwrap();
        }
        index.mark_failed("doc", "X", "boom").await.unwrap();
        let due: Vec<_> =
            index.pending_blocks("doc", 3).await.unwrap().into_iter().map(|b| b.block_id).collect();
        // F exhausted its 3 attempts; P never started; X has attempts left.
        assert_eq!(due, ["P", "X"]);
    }

    #[tokio::test]
    async fn stale_blocks_track_source_and_prompt_versions() {
        let index = index().await;
        let f = fields("Title", &["k"], "Long enough description here.", &[]);
        index.upsert_block("doc", "A", &crop(1), "v1", "p1", "m1", &f).await.unwrap();
        index.upsert_block("doc", "B", &crop(2), "v2", "p1", "m1", &f).await.unwrap();
        let stale: Vec<_> =
            index.stale_blocks("doc", "v2", "p1").await.unwrap().into_iter().map(|b| b.block_id).collect();
        assert_eq!(stale, ["A"]);
        let stale = index.stale_blocks("doc", "v2", "p2").await.unwrap();
        assert_eq!(stale.len(), 2);
    }

    #[tokio::test]
    async fn delete_document_scopes_to_one_document() {
        let index = index().await;
        index.register_block("doc-1", "A", &crop(1), "v1").await.unwrap();
        index.register_block("doc-1", "B", &crop(2), "v1").await.unwrap();
        index.register_block("doc-2", "A", &crop(1), "v1").await.unwrap();
        assert_eq!(index.delete_document("doc-1").await.unwrap(), 2);
        assert!(index.get("doc-2", "A").await.unwrap().is_some());
    }
}
