//! Context budgeting for LLM calls.
//!
//! A single model invocation assembles text blocks, page images, and ROI
//! crops. Left unbounded, that material balloons latency, cost, and model
//! attention. This crate bounds it: every category has an independently
//! configurable ceiling, and when candidates exceed a ceiling the budgeter
//! degrades gracefully instead of failing.
//!
//! Two rules are deliberate and load-bearing:
//!
//! - Pinned items (exact system-code matches, already-cited evidence) are
//!   never dropped. Everything else is included in descending relevance
//!   order until a ceiling is hit.
//! - When images overflow their ceiling, the resolution tier is lowered
//!   first (cheaper per image) down to a configured minimum tier; only then
//!   are images dropped outright.
//!
//! The budgeter is pure: it returns a [`Selection`] and touches nothing.
//! Overflow is signalled with the `truncated` flag, never an error.

mod select;
mod tier;
mod truncate;

pub use crate::select::{
    BlockCandidate, BudgetCeilings, BudgetState, ImageCandidate, RoiCandidate, Selection, select_within_budget,
};
pub use crate::tier::ResolutionTier;
pub use crate::truncate::truncate_chars;
