//! # Recommendation Engine
//! One batch end to end:
//! TierGate → ImageBatchAnalyzer → CommonKeywordExtractor → SourceFanoutAggregator
//! → ContentPolicyFilter → SimilarityRanker → ResultAssembler → history.
//!
//! Collaborators are injected at construction; nothing here is a global
//! except the read-only exclusion table.

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::analyze::{DynImageAnalyzer, HttpVisionAnalyzer, ImageBatchAnalyzer, MockAnalyzer};
use crate::assemble::{AssemblyInput, RecommendationResponse, ResultAssembler};
use crate::config::{AnalyzerProvider, AppConfig};
use crate::error::PipelineError;
use crate::history::{BatchRequestSummary, DynHistoryStore};
use crate::keywords::CommonKeywordExtractor;
use crate::policy::ContentPolicyFilter;
use crate::ranking::SimilarityRanker;
use crate::sources::{build_roster, CapabilityFlags, DynArtworkSource, SourceFanoutAggregator};
use crate::tier::{anon_hash, CheckoutLinks, DynPaymentStore, TierGate, MAX_BATCH_IMAGES};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub user_id: String,
    pub images: Vec<Vec<u8>>,
    pub limit: usize,
    pub flags: CapabilityFlags,
}

/// Tunables taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub source_timeout: Duration,
    pub per_source_limit: usize,
    pub top_keywords: usize,
    pub payment_window: chrono::Duration,
    pub checkout_base_url: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            source_timeout: Duration::from_millis(cfg.fanout.source_timeout_ms),
            per_source_limit: cfg.fanout.per_source_limit,
            top_keywords: cfg.fanout.top_keywords.clamp(1, 10),
            payment_window: chrono::Duration::hours(cfg.payment.window_hours),
            checkout_base_url: cfg.payment.checkout_base_url.clone(),
        }
    }
}

pub struct RecommendationEngine {
    gate: TierGate,
    checkout: CheckoutLinks,
    analyzer: ImageBatchAnalyzer,
    extractor: CommonKeywordExtractor,
    aggregator: SourceFanoutAggregator,
    policy: Arc<ContentPolicyFilter>,
    ranker: SimilarityRanker,
    assembler: ResultAssembler,
    history: DynHistoryStore,
    top_keywords: usize,
}

impl RecommendationEngine {
    pub fn new(
        analyzer: DynImageAnalyzer,
        roster: Vec<DynArtworkSource>,
        payments: DynPaymentStore,
        history: DynHistoryStore,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gate: TierGate::new(payments, settings.payment_window),
            checkout: CheckoutLinks::new(settings.checkout_base_url),
            analyzer: ImageBatchAnalyzer::new(analyzer),
            extractor: CommonKeywordExtractor::new(),
            aggregator: SourceFanoutAggregator::new(
                roster,
                settings.source_timeout,
                settings.per_source_limit,
            ),
            policy: ContentPolicyFilter::global(),
            ranker: SimilarityRanker::new(),
            assembler: ResultAssembler::new(),
            history,
            top_keywords: settings.top_keywords.clamp(1, 10),
        }
    }

    /// Wire analyzer + roster from config around the given stores.
    pub fn from_config(
        cfg: &AppConfig,
        payments: DynPaymentStore,
        history: DynHistoryStore,
    ) -> Result<Self> {
        let settings = EngineSettings::from_config(cfg);
        let analyzer: DynImageAnalyzer = match cfg.analysis.provider {
            AnalyzerProvider::Mock => Arc::new(MockAnalyzer::new()),
            AnalyzerProvider::Http => {
                let endpoint = cfg
                    .analysis
                    .endpoint
                    .as_deref()
                    .context("analysis.provider = \"http\" needs analysis.endpoint")?;
                Arc::new(HttpVisionAnalyzer::new(
                    endpoint,
                    cfg.analysis.api_key.clone(),
                    Duration::from_millis(cfg.analysis.timeout_ms),
                )?)
            }
        };
        let roster = build_roster(&cfg.sources, settings.source_timeout)?;
        tracing::info!(
            analyzer = analyzer.name(),
            sources = roster.len(),
            "recommendation engine configured"
        );
        Ok(Self::new(analyzer, roster, payments, history, settings))
    }

    /// Swap the exclusion table. Test harnesses only; the deployed table is fixed.
    #[doc(hidden)]
    pub fn with_policy(mut self, policy: ContentPolicyFilter) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn aggregator(&self) -> &SourceFanoutAggregator {
        &self.aggregator
    }

    pub async fn recommend(&self, req: BatchRequest) -> Result<RecommendationResponse, PipelineError> {
        let t0 = Instant::now();
        let n = req.images.len();

        if n == 0 {
            return Err(PipelineError::validation("at least one image is required"));
        }
        if n > MAX_BATCH_IMAGES {
            return Err(PipelineError::validation(format!(
                "at most {MAX_BATCH_IMAGES} images per batch, got {n}"
            )));
        }

        let batch_id = Uuid::new_v4();
        let user = anon_hash(&req.user_id);

        // (1) Gate
        let permission = self.gate.check(&req.user_id, n).await;
        if !permission.can_analyze {
            tracing::info!(%batch_id, %user, tier = permission.tier.name.as_str(), "batch denied by tier gate");
            let payment_url = self.checkout.payment_url(&req.user_id, &permission.tier);
            return Err(PipelineError::PermissionDenied {
                tier: permission.tier,
                payment_url,
            });
        }

        // (2) Per-image descriptors, sequential
        let batch = self.analyzer.analyze_batch(&req.images).await;

        // (3) Merge
        let common = self.extractor.extract(&batch.results);
        let query = common.top(self.top_keywords);

        // (4) Fan-out
        let fanout = self.aggregator.fan_out(&query, req.flags).await;
        let total_candidates = fanout.candidates.len();

        // (5) Policy, always before ranking
        let filtered = self.policy.apply(fanout.candidates);

        // (6) Rank
        let ranked = self.ranker.rank(&common, filtered.kept);

        // (7) Assemble
        let limit = req.limit.clamp(1, MAX_LIMIT);
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        let response = self.assembler.assemble(AssemblyInput {
            batch_id,
            tier: permission.tier.name,
            image_results: batch.results,
            analysis_failures: batch.failures,
            common_keywords: common,
            ranked,
            source_results: fanout.results,
            total_candidates,
            excluded_count: filtered.excluded.len(),
            limit,
            processing_time_ms: elapsed_ms,
        });

        let summary = BatchRequestSummary {
            user_id: req.user_id.clone(),
            image_count: n,
            limit,
            tier: permission.tier.name,
            flags: req.flags,
        };
        if let Err(e) = self.history.save(batch_id, &summary, &response).await {
            tracing::warn!(error = ?e, %batch_id, "history save failed; returning response anyway");
            counter!("persistence_failures_total").increment(1);
        }

        counter!("batches_total").increment(1);
        histogram!("pipeline_duration_ms").record(elapsed_ms as f64);
        tracing::info!(
            %batch_id,
            %user,
            images = n,
            analysis_failures = response.summary.analysis_failures,
            common_keywords = response.common_keywords.keywords.len(),
            candidates = total_candidates,
            excluded = response.summary.excluded_count,
            returned = response.recommendations.len(),
            elapsed_ms,
            "batch completed"
        );

        Ok(response)
    }
}
