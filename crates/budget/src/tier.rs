//! Render resolution tiers.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error returned when parsing a [`ResolutionTier`] from a string fails.
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct ParseResolutionTierError(#[error(not(source))] String);

/// Resolution tier for a rendered artifact.
///
/// Tiers are ordered: `Low < Standard < High`. A tier is both part of a
/// render-cache key (renders at different tiers are distinct artifacts) and
/// the knob the budgeter turns before it starts dropping images.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    /// Thumbnail-quality overview renders.
    #[display("low")]
    Low,
    /// Default tier for page overviews.
    #[display("standard")]
    Standard,
    /// Detail tier for ROI crops and fine linework.
    #[display("high")]
    High,
}

impl ResolutionTier {
    /// Raster density used when rendering at this tier.
    pub fn dpi(self) -> u32 {
        match self {
            Self::Low => 96,
            Self::Standard => 150,
            Self::High => 300,
        }
    }

    /// The next tier down, or `None` at the bottom.
    pub fn degrade(self) -> Option<Self> {
        match self {
            Self::High => Some(Self::Standard),
            Self::Standard => Some(Self::Low),
            Self::Low => None,
        }
    }

    /// How many images fit under a base ceiling at this tier.
    ///
    /// Lower tiers cost less per image, so the same budget admits more of
    /// them. The multipliers track the relative per-image token cost of the
    /// tiers' DPI settings, rounded to friendly integers.
    pub fn image_allowance(self, base: usize) -> usize {
        match self {
            Self::High => base,
            Self::Standard => base.saturating_mul(2),
            Self::Low => base.saturating_mul(4),
        }
    }
}

impl FromStr for ResolutionTier {
    type Err = ParseResolutionTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "standard" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            other => Err(ParseResolutionTierError(format!("unknown resolution tier: {other}"))),
        }
    }
}
