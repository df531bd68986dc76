//! The background block indexer.

use crate::backoff::{Backoff, retry};
use crate::error::{ErrorKind, Result};
use crate::extract::Extractor;
use async_stream::stream;
use drawbridge_budget::ResolutionTier;
use drawbridge_render::EvidenceCache;
use drawbridge_store::{BlockCrop, BlockIndex, BlockIndexEntry, RenderKey, UpsertOutcome};
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// Progress events emitted by [`Indexer::run`] as it works through a
/// document's blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    /// Worklist assembled; `blocks` items will be processed.
    Started { blocks: usize },
    /// A block's fields were extracted and written to the index.
    BlockIndexed { block_id: String },
    /// The block was already indexed under the current versions.
    BlockSkipped { block_id: String },
    /// Extraction failed; recorded against the block's attempt budget.
    BlockFailed { block_id: String, attempts: u32, error: String },
    /// The run finished. Failed blocks re-enter the worklist of the next
    /// run until their attempt budget is spent.
    Complete { indexed: usize, skipped: usize, failed: usize },
}

/// Tunables for one indexing run.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Version of the extraction prompt; part of the staleness check.
    pub prompt_version: String,
    /// Tier block crops are rendered at for the model.
    pub crop_tier: ResolutionTier,
    /// Attempt budget per block, across runs.
    pub max_attempts: u32,
    /// Concurrent extractions within the run.
    pub workers: usize,
    /// Backoff applied when the extraction service throttles.
    pub backoff: Backoff,
}

impl IndexerOptions {
    /// Conservative defaults: one worker, patient backoff, detail-tier
    /// crops.
    pub fn new(prompt_version: impl Into<String>) -> Self {
        Self {
            prompt_version: prompt_version.into(),
            crop_tier: ResolutionTier::High,
            max_attempts: 3,
            workers: 1,
            backoff: Backoff::background(),
        }
    }
}

/// Walks a document's pending and stale blocks, rendering each crop and
/// extracting its fields.
///
/// Every block checkpoints through the index as it completes, so an
/// interrupted run resumes where it stopped: the next run's worklist simply
/// no longer contains the blocks that finished. Failures are contained per
/// block and never abort the run.
#[derive(Clone)]
pub struct Indexer {
    index: BlockIndex,
    evidence: EvidenceCache,
    extractor: Arc<dyn Extractor>,
}

impl Indexer {
    pub fn new(index: BlockIndex, evidence: EvidenceCache, extractor: Arc<dyn Extractor>) -> Self {
        Self { index, evidence, extractor }
    }

    /// Index every pending and stale block of a document.
    ///
    /// Only worklist discovery can fail the stream; everything after the
    /// [`IndexEvent::Started`] event is contained per block.
    pub fn run(
        &self,
        document_id: &str,
        source_version: &str,
        options: &IndexerOptions,
    ) -> impl Stream<Item = Result<IndexEvent>> + 'static {
        let indexer = self.clone();
        let document_id = document_id.to_string();
        let source_version = source_version.to_string();
        let options = options.clone();
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let pending = indexer.index.pending_blocks(&document_id, options.max_attempts).await;
            let mut blocks = match pending.or_raise(|| ErrorKind::Index) {
                Ok(blocks) => blocks,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let stale =
                indexer.index.stale_blocks(&document_id, &source_version, &options.prompt_version).await;
            let stale = match stale.or_raise(|| ErrorKind::Index) {
                Ok(blocks) => blocks,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            for block in stale {
                if !blocks.iter().any(|b| b.block_id == block.block_id) {
                    blocks.push(block);
                }
            }
            yield Ok(IndexEvent::Started { blocks: blocks.len() });

            let (mut indexed, mut skipped, mut failed) = (0, 0, 0);
            let mut queue: Vec<_> = blocks
                .into_iter()
                .map(|entry| {
                    process_block(indexer.clone(), document_id.clone(), source_version.clone(), options.clone(), entry)
                })
                .collect();
            let mut processing = FuturesUnordered::new();
            let workers = options.workers.max(1);
            processing.extend(queue.drain(..workers.min(queue.len())));
            while let Some(event) = processing.next().await {
                match &event {
                    IndexEvent::BlockIndexed { .. } => indexed += 1,
                    IndexEvent::BlockSkipped { .. } => skipped += 1,
                    IndexEvent::BlockFailed { .. } => failed += 1,
                    _ => {},
                }
                yield Ok(event);
                // Pop-n-push, but FIFO instead of LIFO.
                if !queue.is_empty() {
                    processing.push(queue.remove(0));
                }
            }
            yield Ok(IndexEvent::Complete { indexed, skipped, failed });
        })
    }
}

/// Process one block end to end. Infallible by construction: every failure
/// becomes a [`IndexEvent::BlockFailed`] checkpoint.
async fn process_block(
    indexer: Indexer,
    document_id: String,
    source_version: String,
    options: IndexerOptions,
    entry: BlockIndexEntry,
) -> IndexEvent {
    let key = match entry.bbox {
        Some(bbox) => RenderKey::roi(&entry.crop_ref, &source_version, entry.page, options.crop_tier, bbox),
        None => RenderKey::page(&entry.crop_ref, &source_version, entry.page, options.crop_tier),
    };
    let crop = match indexer.evidence.get_or_render(&key).await {
        Ok(crop) => crop,
        Err(err) => return record_failure(&indexer.index, &document_id, &entry, &err.to_string()).await,
    };
    let extractor = Arc::clone(&indexer.extractor);
    let fields = match retry(options.backoff, || extractor.extract(&crop)).await {
        Ok(fields) => fields,
        Err(err) => return record_failure(&indexer.index, &document_id, &entry, &err.to_string()).await,
    };
    let crop_spec = BlockCrop { crop_ref: entry.crop_ref.clone(), page: entry.page, bbox: entry.bbox };
    let outcome = indexer
        .index
        .upsert_block(
            &document_id,
            &entry.block_id,
            &crop_spec,
            &source_version,
            &options.prompt_version,
            indexer.extractor.model_id(),
            &fields,
        )
        .await;
    match outcome {
        Ok(UpsertOutcome::Skipped) => IndexEvent::BlockSkipped { block_id: entry.block_id },
        Ok(_) => IndexEvent::BlockIndexed { block_id: entry.block_id },
        Err(err) => record_failure(&indexer.index, &document_id, &entry, &err.to_string()).await,
    }
}

async fn record_failure(index: &BlockIndex, document_id: &str, entry: &BlockIndexEntry, error: &str) -> IndexEvent {
    tracing::warn!(block = %entry.block_id, error, "block indexing failed");
    let attempts = match index.mark_failed(document_id, &entry.block_id, error).await {
        Ok(attempts) => attempts,
        Err(err) => {
            tracing::warn!(block = %entry.block_id, error = %err, "failed to checkpoint the failure");
            entry.attempts + 1
        },
    };
    IndexEvent::BlockFailed { block_id: entry.block_id.clone(), attempts, error: error.to_string() }
}
