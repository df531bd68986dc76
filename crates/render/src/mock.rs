//! In-memory renderer for tests.

use crate::error::{ErrorKind, Result};
use crate::renderer::{RenderSpec, Renderer};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic [`Renderer`] double.
///
/// Produces a payload derived from the [`RenderSpec`] (so distinct specs
/// yield distinct bytes), counts renders, and fails on demand per source.
#[derive(Debug, Default)]
pub struct MockRenderer {
    failing: Mutex<HashSet<String>>,
    renders: AtomicUsize,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful renders performed so far.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Make every render of `source_id` fail until healed.
    pub fn fail_source(&self, source_id: &str) {
        self.failing.lock().unwrap().insert(source_id.to_string());
    }

    /// Let renders of `source_id` succeed again.
    pub fn heal_source(&self, source_id: &str) {
        self.failing.lock().unwrap().remove(source_id);
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>> {
        if self.failing.lock().unwrap().contains(&spec.source_id) {
            exn::bail!(ErrorKind::RenderFailed(format!("scripted failure for {}", spec.source_id)));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        let bbox = spec.bbox.map(|b| b.canonical()).unwrap_or_else(|| "full".to_string());
        Ok(format!("render:{}:{}:{}:{bbox}", spec.source_id, spec.page, spec.dpi).into_bytes())
    }
}
