//! Composite render keys.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use drawbridge_budget::ResolutionTier;
use std::str::FromStr;

/// A normalized bounding box within a page, in the `0..=1` coordinate space.
///
/// Coordinates are rounded to four decimal places on construction so that
/// near-duplicate ROI requests (e.g. `0.45001` vs `0.45`) collapse to one
/// cache entry instead of fragmenting the cache.
#[derive(Debug, Display, Clone, Copy, PartialEq)]
#[display("{x1:.4},{y1:.4},{x2:.4},{y2:.4}")]
pub struct BboxNorm {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl BboxNorm {
    /// Construct a normalized bbox, rounding each coordinate to 4 decimals.
    ///
    /// Fails when any coordinate leaves `0..=1` or the box is empty after
    /// rounding.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        let bbox = Self { x1: round4(x1), y1: round4(y1), x2: round4(x2), y2: round4(y2) };
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if ![bbox.x1, bbox.y1, bbox.x2, bbox.y2].iter().all(|v| in_range(*v)) {
            exn::bail!(ErrorKind::InvalidData("bounding box"));
        }
        if bbox.x2 <= bbox.x1 || bbox.y2 <= bbox.y1 {
            exn::bail!(ErrorKind::InvalidData("bounding box"));
        }
        Ok(bbox)
    }

    /// Canonical fixed-precision string, used in keys and database rows.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl FromStr for BboxNorm {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',').map(|p| p.trim().parse::<f64>());
        let mut next = || -> Result<f64> {
            match parts.next() {
                Some(Ok(v)) => Ok(v),
                _ => exn::bail!(ErrorKind::InvalidData("bounding box")),
            }
        };
        let (x1, y1, x2, y2) = (next()?, next()?, next()?, next()?);
        Self::new(x1, y1, x2, y2)
    }
}

/// Composite key identifying one rendered artifact.
///
/// A full-page render is keyed by `(source, version, page, tier)`; an ROI
/// crop additionally carries its normalized bounding box. The source version
/// is part of the key, so a re-render under a new version never matches (or
/// overwrites) entries from the old version — orphaned old-version entries
/// are reclaimed by ordinary LRU/TTL eviction, deliberately not by explicit
/// cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderKey {
    pub source_id: String,
    pub source_version: String,
    pub page: u32,
    pub tier: ResolutionTier,
    pub bbox: Option<BboxNorm>,
}

impl RenderKey {
    /// Key for a full-page render.
    pub fn page(
        source_id: impl Into<String>,
        source_version: impl Into<String>,
        page: u32,
        tier: ResolutionTier,
    ) -> Self {
        Self { source_id: source_id.into(), source_version: source_version.into(), page, tier, bbox: None }
    }

    /// Key for an ROI crop render.
    pub fn roi(
        source_id: impl Into<String>,
        source_version: impl Into<String>,
        page: u32,
        tier: ResolutionTier,
        bbox: BboxNorm,
    ) -> Self {
        Self { source_id: source_id.into(), source_version: source_version.into(), page, tier, bbox: Some(bbox) }
    }

    /// Stable BLAKE3 digest of the composite key.
    ///
    /// Used as the database primary key and the artifact filename stem. The
    /// components are joined with an ASCII unit separator so that no
    /// combination of source ids and versions can collide by concatenation.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        let bbox = self.bbox.as_ref().map(BboxNorm::canonical).unwrap_or_default();
        let canonical =
            format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", self.source_id, self.source_version, self.page, self.tier, bbox);
        hasher.update(canonical.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}
