//! Interactive and background task pools.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Two independently sized worker pools sharing nothing.
///
/// Interactive work (a user waiting on an answer) and background work
/// (indexing, refresh) draw permits from separate semaphores, so a saturated
/// indexer can never delay an interactive request. Permits are owned and
/// released on drop.
#[derive(Debug, Clone)]
pub struct PoolSet {
    interactive: Arc<Semaphore>,
    background: Arc<Semaphore>,
}

impl PoolSet {
    /// Create pools with the given capacities. Capacities are validated at
    /// configuration load; zero here would deadlock the first acquisition.
    pub fn new(interactive_workers: usize, background_workers: usize) -> Self {
        Self {
            interactive: Arc::new(Semaphore::new(interactive_workers)),
            background: Arc::new(Semaphore::new(background_workers)),
        }
    }

    /// Acquire a permit for interactive work.
    pub async fn interactive(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: semaphore is never closed
        self.interactive.clone().acquire_owned().await.unwrap()
    }

    /// Acquire a permit for background work.
    pub async fn background(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: semaphore is never closed
        self.background.clone().acquire_owned().await.unwrap()
    }

    /// Interactive permits currently free.
    pub fn interactive_available(&self) -> usize {
        self.interactive.available_permits()
    }
}
