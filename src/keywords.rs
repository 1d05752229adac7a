//! # Common Keywords
//! Merges per-image descriptor sets into one batch-wide keyword set.
//!
//! Frequency counts *images carrying a token*, not raw occurrences. A token is
//! kept when it appears in at least `max(1, floor(N * 0.5))` images and is
//! longer than one character. Output order: frequency desc, ties in first-seen order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::analyze::ImageAnalysisResult;

/// Max number of tokens kept in the common set.
pub const MAX_COMMON_KEYWORDS: usize = 20;

/// Fraction of the batch a token must appear in.
pub const COMMON_THRESHOLD_RATIO: f32 = 0.5;

/// Expected descriptor tokens per image (confidence heuristic).
pub const EXPECTED_TOKENS_PER_IMAGE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonKeywords {
    /// Frequency desc, at most [`MAX_COMMON_KEYWORDS`].
    pub keywords: Vec<String>,
    /// Heuristic in [0,1].
    pub confidence: f32,
    /// Images-per-token for every token seen in the batch.
    pub frequency: BTreeMap<String, u32>,
}

impl CommonKeywords {
    /// First `k` keywords, used as the query for the source fan-out.
    pub fn top(&self, k: usize) -> Vec<String> {
        self.keywords.iter().take(k).cloned().collect()
    }
}

/// Minimum number of images a token must appear in for a batch of `n`.
pub fn threshold_for(n: usize) -> u32 {
    ((n as f32 * COMMON_THRESHOLD_RATIO).floor() as u32).max(1)
}

/// Lower-case + trim. Used when merging descriptor sets.
pub fn normalize_descriptor(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Lower-case, strip punctuation, collapse whitespace. Used by the ranker.
pub fn normalize_match_token(s: &str) -> String {
    static RE_PUNCT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("punctuation regex"));
    let lowered = s.to_lowercase();
    let stripped = RE_PUNCT.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length in characters (not bytes), so Hangul tokens count correctly.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommonKeywordExtractor;

impl CommonKeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, results: &[ImageAnalysisResult]) -> CommonKeywords {
        let n = results.len();
        if n == 0 {
            return CommonKeywords::default();
        }

        // Insertion-ordered frequency table.
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, u32> = HashMap::new();

        for image in results {
            let mut seen: HashSet<String> = HashSet::new();
            for raw in image.descriptor_tokens() {
                let token = normalize_descriptor(raw);
                if token.is_empty() || !seen.insert(token.clone()) {
                    continue;
                }
                match counts.get_mut(&token) {
                    Some(c) => *c += 1,
                    None => {
                        counts.insert(token.clone(), 1);
                        order.push(token);
                    }
                }
            }
        }

        let threshold = threshold_for(n);
        let mut common: Vec<(String, u32)> = order
            .iter()
            .filter_map(|t| {
                let f = counts[t];
                (f >= threshold && char_len(t) > 1).then(|| (t.clone(), f))
            })
            .collect();
        // stable: ties keep first-seen order
        common.sort_by(|a, b| b.1.cmp(&a.1));
        common.truncate(MAX_COMMON_KEYWORDS);

        let total: u32 = counts.values().sum();
        let confidence = (total as f32 / (n as f32 * EXPECTED_TOKENS_PER_IMAGE)).min(1.0);

        tracing::debug!(
            images = n,
            threshold,
            distinct_tokens = counts.len(),
            common = common.len(),
            confidence,
            "common keywords extracted"
        );

        CommonKeywords {
            keywords: common.into_iter().map(|(t, _)| t).collect(),
            confidence,
            frequency: counts.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(keywords: &[&str]) -> ImageAnalysisResult {
        ImageAnalysisResult {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            confidence: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn threshold_breakpoints() {
        assert_eq!(threshold_for(1), 1);
        assert_eq!(threshold_for(2), 1);
        assert_eq!(threshold_for(3), 1);
        assert_eq!(threshold_for(4), 2);
        assert_eq!(threshold_for(5), 2);
        assert_eq!(threshold_for(10), 5);
    }

    #[test]
    fn boundary_at_half_of_batch() {
        // N=5 -> threshold 2
        let batch = vec![
            img(&["sea", "sunset"]),
            img(&["sea"]),
            img(&["forest"]),
            img(&["forest", "sunset"]),
            img(&["city"]),
        ];
        let ck = CommonKeywordExtractor::new().extract(&batch);
        assert!(ck.keywords.contains(&"sea".to_string()));
        assert!(ck.keywords.contains(&"sunset".to_string()));
        assert!(ck.keywords.contains(&"forest".to_string()));
        assert!(!ck.keywords.contains(&"city".to_string()));
    }

    #[test]
    fn even_batch_boundary_is_exactly_half() {
        // N=4 -> threshold 2
        let batch = vec![
            img(&["harbor", "fog"]),
            img(&["harbor"]),
            img(&["boats"]),
            img(&["lighthouse"]),
        ];
        let ck = CommonKeywordExtractor::new().extract(&batch);
        assert_eq!(ck.keywords, vec!["harbor"]);
        assert_eq!(ck.frequency.get("fog"), Some(&1));
        assert_eq!(ck.frequency.get("harbor"), Some(&2));
    }

    #[test]
    fn counts_images_not_occurrences() {
        let batch = vec![
            img(&["Blue", "blue ", "BLUE"]),
            img(&["red"]),
            img(&["green"]),
            img(&["yellow"]),
        ];
        let ck = CommonKeywordExtractor::new().extract(&batch);
        assert_eq!(ck.frequency.get("blue"), Some(&1));
        assert!(ck.keywords.is_empty(), "nothing reaches threshold 2");
    }

    #[test]
    fn merges_all_descriptor_fields() {
        let a = ImageAnalysisResult {
            keywords: vec!["portrait".into()],
            colors: vec!["ochre".into()],
            style: vec!["baroque".into()],
            mood: vec!["calm".into()],
            confidence: 0.8,
        };
        let ck = CommonKeywordExtractor::new().extract(&[a.clone(), a]);
        assert_eq!(ck.keywords, vec!["portrait", "ochre", "baroque", "calm"]);
        assert!((ck.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn single_image_degenerates_to_its_own_tokens() {
        let ck = CommonKeywordExtractor::new().extract(&[img(&["tree", "x", "Tree", "river"])]);
        assert_eq!(ck.keywords, vec!["tree", "river"]);
    }

    #[test]
    fn single_character_tokens_never_enter() {
        let ck = CommonKeywordExtractor::new().extract(&[img(&["a", "b"]), img(&["a", "b"])]);
        assert!(ck.keywords.is_empty());
        assert_eq!(ck.frequency.get("a"), Some(&2));
    }

    #[test]
    fn sorted_by_frequency_and_truncated() {
        let many: Vec<String> = (0..30).map(|i| format!("tok{i:02}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let batch = vec![img(&refs), img(&["tok29"])];
        let ck = CommonKeywordExtractor::new().extract(&batch);
        assert_eq!(ck.keywords.len(), MAX_COMMON_KEYWORDS);
        assert_eq!(ck.keywords[0], "tok29");
        assert_eq!(ck.keywords[1], "tok00");
    }

    #[test]
    fn confidence_is_capped() {
        let many: Vec<String> = (0..40).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let ck = CommonKeywordExtractor::new().extract(&[img(&refs)]);
        assert_eq!(ck.confidence, 1.0);
    }

    #[test]
    fn match_token_strips_punctuation() {
        assert_eq!(normalize_match_token("  Oil-Painting! "), "oilpainting");
        assert_eq!(normalize_match_token("Blue,  Sky"), "blue sky");
        assert_eq!(normalize_match_token("풍경."), "풍경");
    }
}
