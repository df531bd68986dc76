//! The external rasterizer trait.

use crate::error::Result;
use async_trait::async_trait;
use drawbridge_store::{BboxNorm, RenderKey};

/// Everything the rasterizer needs to produce one artifact.
///
/// Derived from a [`RenderKey`]; the resolution tier is already collapsed to
/// a concrete DPI because the rasterizer has no notion of tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    /// Source document reference, in the provider's namespace.
    pub source_id: String,
    /// One-based page number.
    pub page: u32,
    pub dpi: u32,
    /// Crop region; `None` renders the full page.
    pub bbox: Option<BboxNorm>,
}

impl From<&RenderKey> for RenderSpec {
    fn from(key: &RenderKey) -> Self {
        Self { source_id: key.source_id.clone(), page: key.page, dpi: key.tier.dpi(), bbox: key.bbox }
    }
}

/// Produces raster artifacts from source documents.
///
/// Implementations wrap whatever actually rasterizes (a PDF library, a
/// headless converter, a remote rendering service). Implementations must be
/// stateless with respect to caching; the cached-render path above this
/// trait owns all reuse decisions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render one page or crop to image bytes.
    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>>;
}
