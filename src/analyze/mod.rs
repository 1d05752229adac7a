//! Per-image descriptor extraction.
//!
//! The analysis collaborator is expensive and rate limited, so the batch is
//! walked sequentially (one in-flight call). A failed image is replaced by a
//! zero-value result and counted; the batch never aborts.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use crate::analyze::http::HttpVisionAnalyzer;
pub use crate::analyze::mock::MockAnalyzer;

/// Descriptors reported for one uploaded image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResult {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub style: Vec<String>,
    #[serde(default)]
    pub mood: Vec<String>,
    /// In [0,1].
    #[serde(default)]
    pub confidence: f32,
}

impl ImageAnalysisResult {
    /// Placeholder used for an image whose analysis failed.
    pub fn zero() -> Self {
        Self::default()
    }

    /// `keywords ∪ colors ∪ style ∪ mood`, in that order, unnormalized.
    pub fn descriptor_tokens(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .iter()
            .chain(self.colors.iter())
            .chain(self.style.iter())
            .chain(self.mood.iter())
            .map(String::as_str)
    }

    /// Trim, drop empties, dedup each field (first occurrence wins) and clamp confidence.
    pub fn sanitized(mut self) -> Self {
        fn clean(v: &mut Vec<String>) {
            let mut seen = std::collections::HashSet::new();
            v.retain_mut(|s| {
                *s = s.trim().to_string();
                !s.is_empty() && seen.insert(s.to_lowercase())
            });
        }
        clean(&mut self.keywords);
        clean(&mut self.colors);
        clean(&mut self.style);
        clean(&mut self.mood);
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Analysis collaborator: one image in, one descriptor set out.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> anyhow::Result<ImageAnalysisResult>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynImageAnalyzer = Arc<dyn ImageAnalyzer>;

/// Outcome of one batch: results in upload order plus the failure count.
#[derive(Debug, Clone, Default)]
pub struct BatchAnalysis {
    pub results: Vec<ImageAnalysisResult>,
    pub failures: usize,
}

pub struct ImageBatchAnalyzer {
    analyzer: DynImageAnalyzer,
}

impl ImageBatchAnalyzer {
    pub fn new(analyzer: DynImageAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn provider_name(&self) -> &'static str {
        self.analyzer.name()
    }

    pub async fn analyze_batch(&self, images: &[Vec<u8>]) -> BatchAnalysis {
        let mut out = BatchAnalysis {
            results: Vec::with_capacity(images.len()),
            failures: 0,
        };

        for (idx, image) in images.iter().enumerate() {
            match self.analyzer.analyze(image).await {
                Ok(res) => out.results.push(res.sanitized()),
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        provider = self.analyzer.name(),
                        image_index = idx,
                        bytes = image.len(),
                        "image analysis failed; using empty result"
                    );
                    counter!("analysis_failures_total").increment(1);
                    out.failures += 1;
                    out.results.push(ImageAnalysisResult::zero());
                }
            }
        }

        out
    }
}
