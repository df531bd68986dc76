use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// Structured fields extracted from a block's rendered crop by the semantic
/// extraction service.
///
/// The schema is strict at the boundary: `title`, `discipline`, `keywords`,
/// and `description` are required, the rest optional. Unknown fields in the
/// payload are ignored (models love to volunteer extras). A payload that
/// fails validation is an extraction failure — it never becomes
/// partially-trusted index data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Block title or caption.
    pub title: String,
    /// Engineering discipline (e.g. "HVAC", "electrical").
    pub discipline: String,
    /// Free-text keyword set.
    pub keywords: Vec<String>,
    /// One-paragraph description of the block's content.
    pub description: String,
    /// Floor or section designation, when legible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    /// Drawing scale (e.g. "1:100"), when legible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    /// System codes referenced by the block (e.g. "B2", "K11").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_codes: Vec<String>,
}

impl ExtractedFields {
    /// Parse and validate an extraction payload.
    pub fn from_json(raw: &str) -> Result<Self> {
        let fields: Self =
            serde_json::from_str(raw).or_raise(|| ErrorKind::Schema("malformed extraction JSON".to_string()))?;
        fields.validate()?;
        Ok(fields)
    }

    /// Validate required fields.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            exn::bail!(ErrorKind::Schema("empty title".to_string()));
        }
        if self.discipline.trim().is_empty() {
            exn::bail!(ErrorKind::Schema("empty discipline".to_string()));
        }
        if !self.keywords.iter().any(|k| !k.trim().is_empty()) {
            exn::bail!(ErrorKind::Schema("no usable keywords".to_string()));
        }
        Ok(())
    }

    /// System codes normalized for exact matching: trimmed, uppercased,
    /// de-duplicated, original order preserved.
    pub fn normalized_codes(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for code in &self.system_codes {
            let normalized = code.trim().to_uppercase();
            if !normalized.is_empty() && !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        seen
    }
}
