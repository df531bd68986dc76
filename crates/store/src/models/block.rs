use crate::error::{Error, ErrorKind};
use crate::key::BboxNorm;
use crate::models::fields::ExtractedFields;
use derive_more::{Display, Error as DeriveError};
use exn::ResultExt;
use std::str::FromStr;
use time::UtcDateTime;

/// Processing state of an indexed block.
///
/// Transitions: `Pending → Indexed | Failed`, with failed blocks re-entering
/// the pipeline until their attempt budget runs out.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    #[display("pending")]
    Pending,
    #[display("indexed")]
    Indexed,
    #[display("failed")]
    Failed,
}

/// Error returned when parsing a [`BlockStatus`] from a string fails.
#[derive(Debug, Display, DeriveError)]
#[display("{_0}")]
pub struct ParseBlockStatusError(#[error(not(source))] String);

impl FromStr for BlockStatus {
    type Err = ParseBlockStatusError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseBlockStatusError(format!("unknown block status: {other}"))),
        }
    }
}

/// One semantically-indexed document sub-region.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockIndexEntry {
    pub document_id: String,
    /// Stable within the parent document.
    pub block_id: String,
    /// Source reference the block's crop renders from.
    pub crop_ref: String,
    pub page: u32,
    pub bbox: Option<BboxNorm>,
    /// Source version the fields were extracted against.
    pub source_version: String,
    /// Extraction prompt version the fields were produced by.
    pub prompt_version: Option<String>,
    /// Model that produced the fields.
    pub model_id: Option<String>,
    pub status: BlockStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Last-known-good extracted fields. Survives a failed re-index, so a
    /// block that indexed once keeps serving candidates even while broken.
    pub fields: Option<ExtractedFields>,
    pub indexed_at: Option<UtcDateTime>,
}

impl BlockIndexEntry {
    /// Whether this entry is due for background reprocessing.
    ///
    /// Stale entries still serve candidate lookups — partial information
    /// beats none for narrowing — so this is a flag, not a filter.
    pub fn is_stale(&self, current_source_version: &str, current_prompt_version: &str) -> bool {
        self.source_version != current_source_version
            || self.prompt_version.as_deref() != Some(current_prompt_version)
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BlockRow {
    pub(crate) document_id: String,
    pub(crate) block_id: String,
    pub(crate) crop_ref: String,
    pub(crate) page: i64,
    pub(crate) bbox: Option<String>,
    pub(crate) source_version: String,
    pub(crate) prompt_version: Option<String>,
    pub(crate) model_id: Option<String>,
    pub(crate) status: String,
    pub(crate) attempts: i64,
    pub(crate) last_error: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) discipline: Option<String>,
    pub(crate) keywords: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) floor: Option<String>,
    pub(crate) scale: Option<String>,
    pub(crate) system_codes: Option<String>,
    pub(crate) indexed_at: Option<i64>,
}

impl BlockRow {
    /// Reassemble the extracted fields, if this row has ever been indexed.
    ///
    /// The field columns are all-or-nothing for the required set; a row with
    /// a title but no discipline is corrupt, not partially indexed.
    fn fields(&self) -> Result<Option<ExtractedFields>, Error> {
        let Some(title) = &self.title else {
            return Ok(None);
        };
        let (Some(discipline), Some(keywords), Some(description)) =
            (&self.discipline, &self.keywords, &self.description)
        else {
            exn::bail!(ErrorKind::InvalidData("extracted fields"));
        };
        Ok(Some(ExtractedFields {
            title: title.clone(),
            discipline: discipline.clone(),
            keywords: serde_json::from_str(keywords).or_raise(|| ErrorKind::InvalidData("keywords"))?,
            description: description.clone(),
            floor: self.floor.clone(),
            scale: self.scale.clone(),
            system_codes: self
                .system_codes
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("system codes"))?
                .unwrap_or_default(),
        }))
    }
}

impl TryFrom<BlockRow> for BlockIndexEntry {
    type Error = Error;
    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        let fields = row.fields()?;
        Ok(Self {
            page: u32::try_from(row.page).or_raise(|| ErrorKind::InvalidData("page number"))?,
            bbox: row.bbox.as_deref().map(str::parse::<BboxNorm>).transpose().or_raise(|| ErrorKind::InvalidData("bounding box"))?,
            status: row.status.parse::<BlockStatus>().or_raise(|| ErrorKind::InvalidData("block status"))?,
            attempts: u32::try_from(row.attempts).or_raise(|| ErrorKind::InvalidData("attempt counter"))?,
            indexed_at: row
                .indexed_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("indexed date"))?,
            document_id: row.document_id,
            block_id: row.block_id,
            crop_ref: row.crop_ref,
            source_version: row.source_version,
            prompt_version: row.prompt_version,
            model_id: row.model_id,
            last_error: row.last_error,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> BlockRow {
        BlockRow {
            document_id: "doc-1".to_string(),
            block_id: "B-004".to_string(),
            crop_ref: "drawings/plan.pdf".to_string(),
            page: 2,
            bbox: None,
            source_version: "etag:9".to_string(),
            prompt_version: Some("extract-v3".to_string()),
            model_id: Some("gemini-flash".to_string()),
            status: "indexed".to_string(),
            attempts: 0,
            last_error: None,
            title: Some("Pump schedule".to_string()),
            discipline: Some("plumbing".to_string()),
            keywords: Some(r#"["pump", "schedule"]"#.to_string()),
            description: Some("Schedule of circulation pumps.".to_string()),
            floor: None,
            scale: None,
            system_codes: Some(r#"["B2"]"#.to_string()),
            indexed_at: Some(1_700_000_000),
        }
    }

    #[test]
    fn indexed_row_roundtrips() {
        let entry = BlockIndexEntry::try_from(row()).unwrap();
        assert_eq!(entry.status, BlockStatus::Indexed);
        let fields = entry.fields.unwrap();
        assert_eq!(fields.system_codes, ["B2"]);
    }

    #[test]
    fn pending_row_has_no_fields() {
        let mut row = row();
        row.status = "pending".to_string();
        row.title = None;
        row.discipline = None;
        row.keywords = None;
        row.description = None;
        row.system_codes = None;
        row.indexed_at = None;
        let entry = BlockIndexEntry::try_from(row).unwrap();
        assert_eq!(entry.status, BlockStatus::Pending);
        assert!(entry.fields.is_none());
    }

    #[test]
    fn half_populated_fields_are_corrupt() {
        let mut row = row();
        row.discipline = None;
        assert!(BlockIndexEntry::try_from(row).is_err());
    }

    #[test]
    fn staleness_tracks_both_versions() {
        let entry = BlockIndexEntry::try_from(row()).unwrap();
        assert!(!entry.is_stale("etag:9", "extract-v3"));
        assert!(entry.is_stale("etag:10", "extract-v3"));
        assert!(entry.is_stale("etag:9", "extract-v4"));
    }
}
