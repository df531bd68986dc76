//! The semantic extraction trait.

use crate::error::Result;
use async_trait::async_trait;
use drawbridge_store::ExtractedFields;

/// Turns a rendered block crop into structured fields.
///
/// Implementations wrap the vision-capable model actually doing the reading.
/// They are responsible for parsing the model's answer into
/// [`ExtractedFields`] and surfacing throttling as
/// [`ErrorKind::RateLimited`](crate::error::ErrorKind::RateLimited) so the
/// indexer can back off instead of burning the block's attempt budget.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identifier of the underlying model, recorded with every extraction.
    fn model_id(&self) -> &str;

    /// Extract structured fields from one crop image.
    async fn extract(&self, crop: &[u8]) -> Result<ExtractedFields>;
}
