//! # Content Policy
//!
//! Compliance layer between fan-out and ranking. Any candidate whose source
//! name, platform tag, source URL or title matches a rule in the exclusion
//! table is dropped, whatever its relevance.
//!
//! - The table is process-wide, read-only, built once ([`ContentPolicyFilter::global`]).
//! - Matching is a case-insensitive substring test on a compacted form
//!   (separators removed), isolated in [`ExclusionRule::matches`].

use metrics::counter;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::Arc;

use crate::sources::CandidateArtwork;

/// Candidate field a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    SourceName,
    Platform,
    SourceUrl,
    Title,
}

pub const ALL_FIELDS: &[RuleField] = &[
    RuleField::SourceName,
    RuleField::Platform,
    RuleField::SourceUrl,
    RuleField::Title,
];

const PROVENANCE_FIELDS: &[RuleField] =
    &[RuleField::SourceName, RuleField::Platform, RuleField::SourceUrl];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionCategory {
    Crowdfunding,
    StudentPortfolio,
    AcademicShowcase,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExclusionRule {
    pub id: String,
    pub category: ExclusionCategory,
    pub fields: Vec<RuleField>,
    /// Stored compacted; see [`compact`].
    pub pattern: String,
}

impl ExclusionRule {
    pub fn new(
        id: impl Into<String>,
        category: ExclusionCategory,
        fields: &[RuleField],
        pattern: &str,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            fields: fields.to_vec(),
            pattern: compact(pattern),
        }
    }

    /// Rule on the source name only.
    pub fn source_name(pattern: &str) -> Self {
        Self::new(
            format!("source:{pattern}"),
            ExclusionCategory::Other,
            &[RuleField::SourceName],
            pattern,
        )
    }

    /// The one predicate every exclusion goes through.
    pub fn matches(&self, artwork: &CandidateArtwork) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        self.fields.iter().any(|f| {
            field_value(artwork, *f).is_some_and(|v| compact(v).contains(&self.pattern))
        })
    }
}

fn field_value(a: &CandidateArtwork, field: RuleField) -> Option<&str> {
    match field {
        RuleField::SourceName => Some(a.source_name.as_str()),
        RuleField::Platform => a.metadata.platform.as_deref(),
        RuleField::SourceUrl => a.metadata.source_url.as_deref(),
        RuleField::Title => Some(a.title.as_str()),
    }
}

/// Lowercase and drop whitespace and common separators, so that
/// "Tumbl-Bug", "tumbl bug" and "www.tumblbug.com" compare alike.
pub fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '.' | '·' | '—' | '–'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn builtin_rules() -> Vec<ExclusionRule> {
    use ExclusionCategory::*;
    let mut rules = Vec::new();

    for p in ["kickstarter", "indiegogo", "gofundme", "tumblbug", "wadiz", "텀블벅", "와디즈"] {
        rules.push(ExclusionRule::new(format!("crowdfunding:{p}"), Crowdfunding, ALL_FIELDS, p));
    }
    for p in ["notefolio", "grafolio", "student-portfolio", "portfolio-aggregator"] {
        rules.push(ExclusionRule::new(
            format!("student_portfolio:{p}"),
            StudentPortfolio,
            PROVENANCE_FIELDS,
            p,
        ));
    }
    for p in ["degree show", "grad show", "graduation exhibition", "졸업전시", "졸업작품전"] {
        rules.push(ExclusionRule::new(
            format!("academic_showcase:{p}"),
            AcademicShowcase,
            ALL_FIELDS,
            p,
        ));
    }
    rules
}

static GLOBAL_POLICY: Lazy<Arc<ContentPolicyFilter>> =
    Lazy::new(|| Arc::new(ContentPolicyFilter::with_rules(builtin_rules())));

/// Outcome of one filter pass.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Survivors in incoming order.
    pub kept: Vec<CandidateArtwork>,
    /// (candidate id, rule id) per dropped candidate.
    pub excluded: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ContentPolicyFilter {
    rules: Vec<ExclusionRule>,
}

impl ContentPolicyFilter {
    /// Process-wide table.
    pub fn global() -> Arc<ContentPolicyFilter> {
        Arc::clone(&GLOBAL_POLICY)
    }

    pub fn with_rules(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// First matching rule, if any.
    pub fn violation(&self, artwork: &CandidateArtwork) -> Option<&ExclusionRule> {
        self.rules.iter().find(|r| r.matches(artwork))
    }

    pub fn is_excluded(&self, artwork: &CandidateArtwork) -> bool {
        self.violation(artwork).is_some()
    }

    pub fn apply(&self, pool: Vec<CandidateArtwork>) -> FilterOutcome {
        let mut out = FilterOutcome {
            kept: Vec::with_capacity(pool.len()),
            excluded: Vec::new(),
        };
        for a in pool {
            match self.violation(&a) {
                Some(rule) => {
                    tracing::debug!(
                        artwork = %a.id,
                        source = %a.source_name,
                        rule = %rule.id,
                        "candidate excluded by content policy"
                    );
                    out.excluded.push((a.id.clone(), rule.id.clone()));
                }
                None => out.kept.push(a),
            }
        }
        if !out.excluded.is_empty() {
            counter!("policy_excluded_total").increment(out.excluded.len() as u64);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ArtworkMetadata;

    fn art(id: &str, source: &str, title: &str, meta: ArtworkMetadata) -> CandidateArtwork {
        CandidateArtwork {
            id: id.into(),
            title: title.into(),
            artist: "Anon".into(),
            keywords: vec!["landscape".into()],
            source_name: source.into(),
            metadata: meta,
        }
    }

    #[test]
    fn each_field_can_trigger_a_rule() {
        let p = ContentPolicyFilter::global();
        assert!(p.is_excluded(&art("1", "Kickstarter", "Sea", Default::default())));
        assert!(p.is_excluded(&art(
            "2",
            "gallery",
            "Sea",
            ArtworkMetadata {
                platform: Some("Tumbl-Bug".into()),
                ..Default::default()
            }
        )));
        assert!(p.is_excluded(&art(
            "3",
            "gallery",
            "Sea",
            ArtworkMetadata {
                source_url: Some("https://www.notefolio.net/x/1".into()),
                ..Default::default()
            }
        )));
        assert!(p.is_excluded(&art("4", "gallery", "2024 Graduation Exhibition", Default::default())));
        assert!(p.is_excluded(&art("5", "gallery", "홍익대 졸업전시 작품", Default::default())));
    }

    #[test]
    fn ordinary_candidates_pass() {
        let p = ContentPolicyFilter::global();
        assert!(!p.is_excluded(&art("1", "local-catalog", "Blue Mountain", Default::default())));
        // student-portfolio rules do not look at titles
        assert!(!p.is_excluded(&art("2", "gallery", "My Notefolio Days", Default::default())));
    }

    #[test]
    fn apply_preserves_order_of_survivors() {
        let p = ContentPolicyFilter::with_rules(vec![ExclusionRule::source_name("blocked-platform")]);
        let pool = vec![
            art("a", "ok", "A", Default::default()),
            art("b", "blocked-platform", "B", Default::default()),
            art("c", "ok", "C", Default::default()),
        ];
        let out = p.apply(pool);
        let ids: Vec<_> = out.kept.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(out.excluded, vec![("b".to_string(), "source:blocked-platform".to_string())]);
    }

    #[test]
    fn compact_normalizes_separators() {
        assert_eq!(compact("Degree Show"), "degreeshow");
        assert_eq!(compact("www.Tumbl_bug.com"), "wwwtumblbugcom");
    }

    #[test]
    fn empty_pattern_never_matches() {
        let r = ExclusionRule::source_name(" - ");
        assert!(!r.matches(&art("1", "anything", "x", Default::default())));
    }
}
