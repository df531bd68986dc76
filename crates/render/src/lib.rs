//! Artifact rendering behind the evidence cache.
//!
//! The actual rasterizer (PDF library, remote rendering service) lives
//! behind the [`Renderer`] trait; this crate owns the decision of when to
//! call it. [`EvidenceCache::get_or_render`] is the one entry point: cache
//! hit short-circuits, miss renders and commits the artifact through the
//! cache's idempotent insert, and the commit survives the caller giving up
//! mid-request.

mod cache;
pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod renderer;

pub use crate::cache::EvidenceCache;
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockRenderer;
pub use crate::renderer::{RenderSpec, Renderer};
