//! In-memory extractor for tests.

use crate::error::{ErrorKind, Result};
use crate::extract::Extractor;
use async_trait::async_trait;
use drawbridge_store::ExtractedFields;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic [`Extractor`] double.
///
/// Produces fields derived from the crop bytes, counts calls, and supports
/// two scripted failure modes: rate-limit the next N calls, or permanently
/// fail any crop whose payload contains a marker substring.
#[derive(Debug, Default)]
pub struct MockExtractor {
    calls: AtomicUsize,
    rate_limit_remaining: AtomicUsize,
    failing_markers: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total extraction calls observed, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Rate-limit the next `n` calls.
    pub fn rate_limit_next(&self, n: usize) {
        self.rate_limit_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail every crop whose payload contains `marker`.
    pub fn fail_matching(&self, marker: &str) {
        self.failing_markers.lock().unwrap().push(marker.to_string());
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn model_id(&self) -> &str {
        "mock-extractor"
    }

    async fn extract(&self, crop: &[u8]) -> Result<ExtractedFields> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .rate_limit_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            exn::bail!(ErrorKind::RateLimited);
        }
        let payload = String::from_utf8_lossy(crop);
        if self.failing_markers.lock().unwrap().iter().any(|marker| payload.contains(marker.as_str())) {
            exn::bail!(ErrorKind::Schema(format!("scripted failure for {payload}")));
        }
        Ok(ExtractedFields {
            title: format!("Extracted from {payload}"),
            discipline: "general".to_string(),
            keywords: vec!["auto".to_string()],
            description: "Deterministic extraction produced for testing.".to_string(),
            floor: None,
            scale: None,
            system_codes: Vec::new(),
        })
    }
}
