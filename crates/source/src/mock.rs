//! In-memory source provider for testing.

use crate::error::{ErrorKind, Result};
use crate::provider::{SourceMeta, SourceProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct MockSource {
    meta: Option<SourceMeta>,
    content: Vec<u8>,
}

/// In-memory source provider for testing.
///
/// Sources are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods operate on `&self` without external synchronisation. Failure of
/// either channel (`head`, `fetch`) can be scripted per provider, which is
/// how the version-resolver fallback paths get exercised.
///
/// # Examples
///
/// ```
/// use drawbridge_source::{MockProvider, SourceProvider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = MockProvider::default();
/// provider.add_source("drawings/site-plan.pdf", b"%PDF-1.7...".to_vec(), None).await;
/// assert!(provider.head("drawings/site-plan.pdf").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockProvider {
    sources: RwLock<HashMap<String, MockSource>>,
    fail_head: RwLock<bool>,
    fail_fetch: RwLock<bool>,
}

impl MockProvider {
    /// Register a source with optional metadata.
    pub async fn add_source(&self, reference: impl Into<String>, content: Vec<u8>, meta: Option<SourceMeta>) {
        self.sources.write().await.insert(reference.into(), MockSource { meta, content });
    }

    /// Replace a source's content (and metadata), simulating an upstream change.
    pub async fn replace_content(&self, reference: &str, content: Vec<u8>, meta: Option<SourceMeta>) {
        let mut sources = self.sources.write().await;
        sources.insert(reference.to_string(), MockSource { meta, content });
    }

    /// Make every subsequent `head` call fail.
    pub async fn fail_head(&self, fail: bool) {
        *self.fail_head.write().await = fail;
    }

    /// Make every subsequent `fetch` call fail.
    pub async fn fail_fetch(&self, fail: bool) {
        *self.fail_fetch.write().await = fail;
    }
}

#[async_trait]
impl SourceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn head(&self, reference: &str) -> Result<Option<SourceMeta>> {
        if *self.fail_head.read().await {
            exn::bail!(ErrorKind::Io);
        }
        let sources = self.sources.read().await;
        match sources.get(reference) {
            Some(source) => Ok(source.meta.clone()),
            None => exn::bail!(ErrorKind::InvalidReference(reference.to_string())),
        }
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if *self.fail_fetch.read().await {
            exn::bail!(ErrorKind::Io);
        }
        let sources = self.sources.read().await;
        match sources.get(reference) {
            Some(source) => Ok(source.content.clone()),
            None => exn::bail!(ErrorKind::InvalidReference(reference.to_string())),
        }
    }
}
