//! # Similarity Ranker
//! Pure scoring of `(CommonKeywords, CandidateArtwork)` pairs. No I/O.
//!
//! total = clamp(matches / max(|common|, |candidate|) + 0.3 * confidence, 0, 1)
//! where an exact hit counts 1 and a substring hit (common token > 3 chars) 0.5.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::keywords::{char_len, normalize_match_token, CommonKeywords};
use crate::sources::CandidateArtwork;

pub const CONFIDENCE_BOOST: f32 = 0.3;
pub const PARTIAL_MATCH_WEIGHT: f32 = 0.5;
pub const MAX_MATCHED_KEYWORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityScore {
    /// In [0,1].
    pub total: f32,
    /// In [0,100].
    pub keyword_match_percent: u32,
    /// Exact hits first, then partial; at most [`MAX_MATCHED_KEYWORDS`].
    pub matched_keywords: Vec<String>,
    /// In [0,100].
    pub confidence_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedArtwork {
    #[serde(flatten)]
    pub artwork: CandidateArtwork,
    pub similarity: SimilarityScore,
}

/// Normalize + dedup, keeping first-seen order and dropping empties.
fn token_set<'a>(raw: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| normalize_match_token(s))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, common: &CommonKeywords, candidate: &CandidateArtwork) -> SimilarityScore {
        let common_tokens = token_set(&common.keywords);
        let cand_tokens = token_set(&candidate.keywords);
        let cand_lookup: HashSet<&str> = cand_tokens.iter().map(String::as_str).collect();

        let exact: Vec<&String> = common_tokens
            .iter()
            .filter(|t| char_len(t) > 1 && cand_lookup.contains(t.as_str()))
            .collect();
        let partial: Vec<&String> = common_tokens
            .iter()
            .filter(|t| char_len(t) > 3 && !cand_lookup.contains(t.as_str()))
            .filter(|t| {
                cand_tokens
                    .iter()
                    .any(|c| c.contains(t.as_str()) || t.contains(c.as_str()))
            })
            .collect();

        let total_matches = exact.len() as f32 + PARTIAL_MATCH_WEIGHT * partial.len() as f32;

        let keyword_match_percent = if common_tokens.is_empty() {
            0
        } else {
            ((100.0 * total_matches / common_tokens.len() as f32).round() as u32).min(100)
        };

        let denom = common_tokens.len().max(cand_tokens.len());
        let base = if denom == 0 {
            0.0
        } else {
            total_matches / denom as f32
        };
        let total = (base + CONFIDENCE_BOOST * common.confidence).clamp(0.0, 1.0);

        let matched_keywords = exact
            .into_iter()
            .chain(partial)
            .take(MAX_MATCHED_KEYWORDS)
            .cloned()
            .collect();

        SimilarityScore {
            total,
            keyword_match_percent,
            matched_keywords,
            confidence_percent: (common.confidence.clamp(0.0, 1.0) * 100.0).round() as u32,
        }
    }

    /// Score every candidate and sort by `total` desc. Stable: ties keep pool order.
    pub fn rank(&self, common: &CommonKeywords, pool: Vec<CandidateArtwork>) -> Vec<RankedArtwork> {
        let mut ranked: Vec<RankedArtwork> = pool
            .into_iter()
            .map(|artwork| {
                let similarity = self.score(common, &artwork);
                RankedArtwork {
                    artwork,
                    similarity,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total.total_cmp(&a.similarity.total));
        ranked
    }
}
