//! Packages one batch into the response returned to the caller and stored in history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyze::ImageAnalysisResult;
use crate::keywords::CommonKeywords;
use crate::ranking::RankedArtwork;
use crate::sources::SourceQueryResult;
use crate::tier::TierName;

const TOP_MATCHES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub name: String,
    pub success: bool,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopMatch {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub source_name: String,
    pub score: f32,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub tier: TierName,
    pub image_count: usize,
    pub analysis_failures: usize,
    pub sources_queried: usize,
    pub sources_failed: usize,
    /// Pool size after fan-out, before policy.
    pub total_candidates: usize,
    pub excluded_count: usize,
    /// Mean `similarity.total` over the returned recommendations.
    pub average_similarity: f32,
    pub top_matches: Vec<TopMatch>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub image_results: Vec<ImageAnalysisResult>,
    pub common_keywords: CommonKeywords,
    pub recommendations: Vec<RankedArtwork>,
    pub sources: Vec<SourceSummary>,
    pub summary: ResponseSummary,
}

/// Everything the assembler needs from the earlier stages.
pub struct AssemblyInput {
    pub batch_id: Uuid,
    pub tier: TierName,
    pub image_results: Vec<ImageAnalysisResult>,
    pub analysis_failures: usize,
    pub common_keywords: CommonKeywords,
    pub ranked: Vec<RankedArtwork>,
    pub source_results: Vec<SourceQueryResult>,
    pub total_candidates: usize,
    pub excluded_count: usize,
    pub limit: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, input: AssemblyInput) -> RecommendationResponse {
        let mut recommendations = input.ranked;
        recommendations.truncate(input.limit);

        let average_similarity = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.similarity.total).sum::<f32>()
                / recommendations.len() as f32
        };

        let top_matches = recommendations
            .iter()
            .take(TOP_MATCHES)
            .map(|r| TopMatch {
                id: r.artwork.id.clone(),
                title: r.artwork.title.clone(),
                artist: r.artwork.artist.clone(),
                source_name: r.artwork.source_name.clone(),
                score: r.similarity.total,
                matched_keywords: r.similarity.matched_keywords.clone(),
            })
            .collect();

        let sources: Vec<SourceSummary> = input
            .source_results
            .into_iter()
            .map(|r| SourceSummary {
                count: r.artworks.len(),
                name: r.source_name,
                success: r.success,
                error: r.error,
            })
            .collect();

        let summary = ResponseSummary {
            tier: input.tier,
            image_count: input.image_results.len(),
            analysis_failures: input.analysis_failures,
            sources_queried: sources.len(),
            sources_failed: sources.iter().filter(|s| !s.success).count(),
            total_candidates: input.total_candidates,
            excluded_count: input.excluded_count,
            average_similarity,
            top_matches,
            processing_time_ms: input.processing_time_ms,
        };

        RecommendationResponse {
            batch_id: input.batch_id,
            created_at: Utc::now(),
            image_results: input.image_results,
            common_keywords: input.common_keywords,
            recommendations,
            sources,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::SimilarityScore;
    use crate::sources::CandidateArtwork;

    fn ranked(id: &str, total: f32) -> RankedArtwork {
        RankedArtwork {
            artwork: CandidateArtwork {
                id: id.into(),
                title: format!("T{id}"),
                artist: "A".into(),
                keywords: vec![],
                source_name: "s".into(),
                metadata: Default::default(),
            },
            similarity: SimilarityScore {
                total,
                matched_keywords: vec!["sea".into()],
                ..Default::default()
            },
        }
    }

    fn input(ranked: Vec<RankedArtwork>, limit: usize) -> AssemblyInput {
        AssemblyInput {
            batch_id: Uuid::new_v4(),
            tier: TierName::Free,
            image_results: vec![ImageAnalysisResult::zero()],
            analysis_failures: 1,
            common_keywords: CommonKeywords::default(),
            ranked,
            source_results: vec![
                SourceQueryResult::ok("a", vec![], 0),
                SourceQueryResult::failed("b", "down"),
            ],
            total_candidates: 4,
            excluded_count: 1,
            limit,
            processing_time_ms: 12,
        }
    }

    #[test]
    fn caps_to_limit_and_summarizes() {
        let r = ResultAssembler.assemble(input(
            vec![ranked("1", 0.9), ranked("2", 0.7), ranked("3", 0.5), ranked("4", 0.1)],
            2,
        ));
        assert_eq!(r.recommendations.len(), 2);
        assert!((r.summary.average_similarity - 0.8).abs() < 1e-6);
        assert_eq!(r.summary.top_matches.len(), 2);
        assert_eq!(r.summary.top_matches[0].id, "1");
        assert_eq!(r.summary.sources_queried, 2);
        assert_eq!(r.summary.sources_failed, 1);
        assert_eq!(r.summary.analysis_failures, 1);
        assert_eq!(r.sources[1].error.as_deref(), Some("down"));
    }

    #[test]
    fn empty_pool_has_zero_average() {
        let r = ResultAssembler.assemble(input(vec![], 10));
        assert_eq!(r.summary.average_similarity, 0.0);
        assert!(r.summary.top_matches.is_empty());
    }

    #[test]
    fn serializes_camel_case() {
        let r = ResultAssembler.assemble(input(vec![ranked("1", 0.9)], 5));
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("batchId").is_some());
        assert!(v["summary"].get("processingTimeMs").is_some());
        assert_eq!(v["recommendations"][0]["id"], "1");
        assert!(v["recommendations"][0]["similarity"].get("keywordMatchPercent").is_some());
    }
}
