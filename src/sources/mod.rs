// src/sources/mod.rs
//! Artwork source collaborators: one uniform `search(keywords, limit)` per
//! external content source, plus the roster built from config.

pub mod catalog;
pub mod fanout;
pub mod http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SourceConfig, SourceKind};

pub use crate::sources::catalog::CatalogSource;
pub use crate::sources::fanout::{FanoutOutcome, SourceFanoutAggregator};
pub use crate::sources::http::HttpSource;

/// Optional provenance fields reported by a source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkMetadata {
    /// Hosting platform tag, e.g. "artsy", "tumblbug".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateArtwork {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Filled in by the aggregator with the roster name that returned it.
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub metadata: ArtworkMetadata,
}

/// One per source per request; never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQueryResult {
    pub source_name: String,
    pub success: bool,
    pub artworks: Vec<CandidateArtwork>,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceQueryResult {
    pub fn ok(source_name: impl Into<String>, artworks: Vec<CandidateArtwork>, total: usize) -> Self {
        Self {
            source_name: source_name.into(),
            success: true,
            artworks,
            total,
            error: None,
        }
    }

    /// Empty contribution for a source that failed, timed out or said `success: false`.
    pub fn failed(source_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            success: false,
            artworks: Vec::new(),
            total: 0,
            error: Some(error.into()),
        }
    }
}

/// Groups of sources that the caller can switch on/off per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Always queried.
    #[default]
    Core,
    Korean,
    StudentArt,
    International,
}

/// Per-request switches for the optional categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    pub include_korean: bool,
    pub include_student_art: bool,
    pub include_international: bool,
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        Self {
            include_korean: true,
            include_student_art: true,
            include_international: true,
        }
    }
}

impl CapabilityFlags {
    pub fn allows(&self, category: SourceCategory) -> bool {
        match category {
            SourceCategory::Core => true,
            SourceCategory::Korean => self.include_korean,
            SourceCategory::StudentArt => self.include_student_art,
            SourceCategory::International => self.include_international,
        }
    }
}

#[async_trait]
pub trait ArtworkSource: Send + Sync {
    async fn search(&self, keywords: &[String], limit: usize) -> Result<SourceQueryResult>;
    fn name(&self) -> &str;
    fn category(&self) -> SourceCategory;
}

pub type DynArtworkSource = Arc<dyn ArtworkSource>;

/// Build the roster from config. A broken entry is an error: a silently
/// missing source would look like a permanently failing one.
pub fn build_roster(cfgs: &[SourceConfig], timeout: Duration) -> Result<Vec<DynArtworkSource>> {
    let mut roster: Vec<DynArtworkSource> = Vec::with_capacity(cfgs.len());
    for c in cfgs {
        let src: DynArtworkSource = match c.kind {
            SourceKind::Catalog => {
                let path = c
                    .path
                    .as_ref()
                    .with_context(|| format!("source '{}' (catalog) needs `path`", c.name))?;
                Arc::new(CatalogSource::from_path(&c.name, c.category, path)?)
            }
            SourceKind::Http => {
                let endpoint = c
                    .endpoint
                    .as_ref()
                    .with_context(|| format!("source '{}' (http) needs `endpoint`", c.name))?;
                Arc::new(HttpSource::new(&c.name, c.category, endpoint, timeout)?)
            }
        };
        roster.push(src);
    }
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_sources_ignore_flags() {
        let off = CapabilityFlags {
            include_korean: false,
            include_student_art: false,
            include_international: false,
        };
        assert!(off.allows(SourceCategory::Core));
        assert!(!off.allows(SourceCategory::Korean));
        assert!(!off.allows(SourceCategory::StudentArt));
        assert!(!off.allows(SourceCategory::International));
        assert!(CapabilityFlags::default().allows(SourceCategory::StudentArt));
    }

    #[test]
    fn roster_requires_path_for_catalog() {
        let cfg = SourceConfig {
            name: "broken".into(),
            kind: SourceKind::Catalog,
            category: SourceCategory::Core,
            path: None,
            endpoint: None,
        };
        let err = build_roster(&[cfg], Duration::from_secs(1)).err().unwrap();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn artwork_deserializes_with_defaults() {
        let a: CandidateArtwork =
            serde_json::from_str(r#"{"id":"1","title":"Untitled"}"#).unwrap();
        assert!(a.keywords.is_empty());
        assert_eq!(a.metadata, ArtworkMetadata::default());
    }
}
