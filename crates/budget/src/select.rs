//! Budgeted selection of blocks, images, and ROI crops.

use crate::tier::ResolutionTier;
use crate::truncate::truncate_chars;

/// Independently configurable ceilings for one LLM invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCeilings {
    /// Base image ceiling per call, costed at [`ResolutionTier::High`].
    /// Lower tiers admit proportionally more images; see
    /// [`ResolutionTier::image_allowance`].
    pub max_images: usize,
    /// Maximum ROI crops per iteration.
    pub max_rois: usize,
    /// Maximum text blocks included in assembled materials.
    pub max_blocks: usize,
    /// Maximum total context characters across all included block text.
    pub max_context_chars: usize,
    /// Floor for tier degradation. The budgeter never renders below this.
    pub min_tier: ResolutionTier,
}

impl Default for BudgetCeilings {
    fn default() -> Self {
        Self {
            max_images: 8,
            max_rois: 4,
            max_blocks: 24,
            max_context_chars: 60_000,
            min_tier: ResolutionTier::Low,
        }
    }
}

/// A text block candidate for inclusion in assembled materials.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCandidate {
    /// Block identifier, stable within its parent document.
    pub id: String,
    /// Block text; may come back truncated in the selection.
    pub text: String,
    /// Relevance score from candidate lookup.
    pub relevance: f32,
    /// Pinned items (exact system-code matches, already-cited evidence)
    /// sort ahead of everything else and are the last to be excluded.
    pub pinned: bool,
}

/// A page-image candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub id: String,
    pub relevance: f32,
    pub pinned: bool,
}

/// An ROI crop candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiCandidate {
    pub id: String,
    pub relevance: f32,
    pub pinned: bool,
}

/// Counters accumulated while building a selection. Ephemeral; returned for
/// observability, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetState {
    pub chars: usize,
    pub images: usize,
    pub rois: usize,
    pub blocks: usize,
}

/// The outcome of budgeted selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub blocks: Vec<BlockCandidate>,
    pub images: Vec<ImageCandidate>,
    pub rois: Vec<RoiCandidate>,
    /// Tier the included images should be rendered at (possibly degraded
    /// from the requested tier).
    pub tier: ResolutionTier,
    /// Set whenever a ceiling excluded or shortened anything, *or* the tier
    /// was degraded. Consumers must surface this ("answer may be
    /// incomplete") rather than silently narrowing context.
    pub truncated: bool,
    pub state: BudgetState,
}

/// Pinned first, then descending relevance. `sort_by` is stable, so equal
/// candidates keep their input order and the selection is deterministic.
fn priority_order<T, F: Fn(&T) -> (bool, f32)>(items: &mut [T], key: F) {
    items.sort_by(|a, b| {
        let (a_pin, a_rel) = key(a);
        let (b_pin, b_rel) = key(b);
        b_pin.cmp(&a_pin).then_with(|| b_rel.total_cmp(&a_rel))
    });
}

/// Selects as much candidate material as the ceilings allow.
///
/// Application order is fixed:
///
/// 1. Every category is sorted pinned-first, then by descending relevance.
/// 2. Blocks are admitted until the block-count or character ceiling is hit.
///    The block that straddles the character ceiling is included truncated at
///    a character boundary; everything after it is excluded.
/// 3. Images are admitted against a tier-dependent allowance. When they
///    overflow, the tier is degraded step by step (never below
///    `ceilings.min_tier`) before any image is dropped.
/// 4. ROIs are capped at `max_rois`.
///
/// Count ceilings are strict: a pinned item can only be excluded in the
/// pathological case where pinned items *alone* overflow a ceiling, because
/// pinned items are admitted first.
pub fn select_within_budget(
    mut blocks: Vec<BlockCandidate>,
    mut images: Vec<ImageCandidate>,
    mut rois: Vec<RoiCandidate>,
    requested_tier: ResolutionTier,
    ceilings: &BudgetCeilings,
) -> Selection {
    let mut state = BudgetState::default();
    let mut truncated = false;

    priority_order(&mut blocks, |b| (b.pinned, b.relevance));
    priority_order(&mut images, |i| (i.pinned, i.relevance));
    priority_order(&mut rois, |r| (r.pinned, r.relevance));

    // Blocks: count ceiling and character ceiling together.
    let mut included_blocks = Vec::new();
    for mut block in blocks {
        if included_blocks.len() >= ceilings.max_blocks {
            truncated = true;
            break;
        }
        let remaining = ceilings.max_context_chars.saturating_sub(state.chars);
        if remaining == 0 {
            truncated = true;
            break;
        }
        let len = block.text.chars().count();
        if len > remaining {
            block.text = truncate_chars(&block.text, remaining).to_string();
            state.chars += remaining;
            truncated = true;
            included_blocks.push(block);
            break;
        }
        state.chars += len;
        included_blocks.push(block);
    }
    state.blocks = included_blocks.len();

    // Images: degrade the tier before dropping anything.
    let mut tier = requested_tier;
    while images.len() > tier.image_allowance(ceilings.max_images) {
        match tier.degrade() {
            Some(lower) if lower >= ceilings.min_tier => {
                tier = lower;
                // Degradation loses detail even when it saves every image.
                truncated = true;
            },
            _ => break,
        }
    }
    let allowance = tier.image_allowance(ceilings.max_images);
    if images.len() > allowance {
        truncated = true;
        images.truncate(allowance);
    }
    state.images = images.len();

    // ROIs: plain count ceiling.
    if rois.len() > ceilings.max_rois {
        truncated = true;
        rois.truncate(ceilings.max_rois);
    }
    state.rois = rois.len();

    if truncated {
        tracing::debug!(
            blocks = state.blocks,
            images = state.images,
            rois = state.rois,
            chars = state.chars,
            tier = %tier,
            "context budget truncated selection"
        );
    }

    Selection { blocks: included_blocks, images, rois, tier, truncated, state }
}
