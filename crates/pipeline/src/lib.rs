//! Background semantic indexing and shared concurrency plumbing.
//!
//! The extraction model lives behind the [`Extractor`] trait; the
//! [`Indexer`] drives it over a document's pending and stale blocks with
//! bounded concurrency, per-block checkpointing, and backoff when the
//! service throttles. [`PoolSet`] keeps interactive work on a separate
//! semaphore from all of this, so indexing load never queues ahead of a
//! waiting user.

mod backoff;
pub mod error;
mod extract;
mod indexer;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod pool;

pub use crate::backoff::{Backoff, retry};
pub use crate::extract::Extractor;
pub use crate::indexer::{IndexEvent, Indexer, IndexerOptions};
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockExtractor;
pub use crate::pool::PoolSet;
