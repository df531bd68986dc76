//! The cached-render path: lookup, render on miss, idempotent insert.

use crate::error::{ErrorKind, Result};
use crate::renderer::{RenderSpec, Renderer};
use drawbridge_store::{RenderCache, RenderKey};
use exn::ResultExt;
use std::sync::Arc;
use tracing::instrument;

/// Serves rendered evidence, rendering only on cache miss.
///
/// The insert after a successful render runs on a detached task: a caller
/// that gives up between the render completing and the bookkeeping landing
/// (a dropped request, a timeout one layer up) must not waste the finished
/// work, and a half-registered artifact must never be observable. Concurrent
/// misses for the same key may both render; the cache's no-clobber insert
/// converges them on one durable payload.
#[derive(Clone)]
pub struct EvidenceCache {
    cache: RenderCache,
    renderer: Arc<dyn Renderer>,
}

impl EvidenceCache {
    pub fn new(cache: RenderCache, renderer: Arc<dyn Renderer>) -> Self {
        Self { cache, renderer }
    }

    /// The underlying cache repository, for eviction passes and stats.
    pub fn store(&self) -> &RenderCache {
        &self.cache
    }

    /// Fetch the artifact for a key, rendering it if absent.
    ///
    /// Always returns the durable payload: when a concurrent render of the
    /// same key won the insert race, the winner's bytes come back, not the
    /// bytes rendered here.
    #[instrument(skip(self), fields(key = %key.digest()))]
    pub async fn get_or_render(&self, key: &RenderKey) -> Result<Vec<u8>> {
        if let Some(entry) = self.cache.lookup(key).await.or_raise(|| ErrorKind::Cache)? {
            tracing::debug!("cache hit");
            return self.cache.read(&entry).or_raise(|| ErrorKind::Cache);
        }
        tracing::debug!("cache miss, rendering");
        let spec = RenderSpec::from(key);
        let bytes = self.renderer.render(&spec).await?;
        let insert = tokio::spawn({
            let (cache, key) = (self.cache.clone(), key.clone());
            async move { cache.insert(&key, &bytes).await }
        });
        let entry = insert.await.or_raise(|| ErrorKind::Cache)?.or_raise(|| ErrorKind::Cache)?;
        self.cache.read(&entry).or_raise(|| ErrorKind::Cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRenderer;
    use drawbridge_budget::ResolutionTier;
    use drawbridge_store::{ArtifactStore, Database};

    async fn evidence() -> (tempfile::TempDir, Arc<MockRenderer>, EvidenceCache) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let cache = RenderCache::new(&db, ArtifactStore::open(dir.path()).unwrap());
        let renderer = Arc::new(MockRenderer::new());
        let evidence = EvidenceCache::new(cache, Arc::clone(&renderer) as Arc<dyn Renderer>);
        (dir, renderer, evidence)
    }

    fn key(page: u32) -> RenderKey {
        RenderKey::page("plan.pdf", "v1", page, ResolutionTier::Standard)
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let (_dir, renderer, evidence) = evidence().await;
        let first = evidence.get_or_render(&key(1)).await.unwrap();
        let second = evidence.get_or_render(&key(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(renderer.render_count(), 1);
    }

    #[tokio::test]
    async fn distinct_pages_render_separately() {
        let (_dir, renderer, evidence) = evidence().await;
        let one = evidence.get_or_render(&key(1)).await.unwrap();
        let two = evidence.get_or_render(&key(2)).await.unwrap();
        assert_ne!(one, two);
        assert_eq!(renderer.render_count(), 2);
    }

    #[tokio::test]
    async fn render_failure_propagates_and_is_not_cached() {
        let (_dir, renderer, evidence) = evidence().await;
        renderer.fail_source("plan.pdf");
        let err = evidence.get_or_render(&key(1)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RenderFailed(_)));
        assert_eq!(evidence.store().stats().await.unwrap().entries, 0);
        // The failure was transient; the next request renders fresh.
        renderer.heal_source("plan.pdf");
        evidence.get_or_render(&key(1)).await.unwrap();
        assert_eq!(evidence.store().stats().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn insert_commits_even_when_the_caller_drops_out() {
        let (_dir, renderer, evidence) = evidence().await;
        let key = key(1);
        let mut request = Box::pin(evidence.get_or_render(&key));
        // Drive the request until the render has happened, then abandon it
        // before the insert resolves.
        while renderer.render_count() == 0 {
            let _ = futures::poll!(request.as_mut());
            tokio::task::yield_now().await;
        }
        drop(request);
        // The detached insert still lands.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while evidence.store().lookup(&key).await.unwrap().is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("abandoned render was never committed");
        assert_eq!(renderer.render_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_converge_on_one_payload() {
        let (_dir, _renderer, evidence) = evidence().await;
        let key = Arc::new(key(1));
        let (a, b) = tokio::join!(
            tokio::spawn({
                let (evidence, key) = (evidence.clone(), Arc::clone(&key));
                async move { evidence.get_or_render(&key).await }
            }),
            tokio::spawn({
                let (evidence, key) = (evidence.clone(), Arc::clone(&key));
                async move { evidence.get_or_render(&key).await }
            }),
        );
        assert_eq!(a.unwrap().unwrap(), b.unwrap().unwrap());
        assert_eq!(evidence.store().stats().await.unwrap().entries, 1);
    }
}
