// src/sources/catalog.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;

use crate::keywords::normalize_match_token;
use crate::sources::{ArtworkSource, CandidateArtwork, SourceCategory, SourceQueryResult};

/// Local JSON catalogue (array of artworks) searched by keyword overlap.
pub struct CatalogSource {
    name: String,
    category: SourceCategory,
    artworks: Vec<CandidateArtwork>,
}

impl CatalogSource {
    pub fn from_artworks(
        name: impl Into<String>,
        category: SourceCategory,
        artworks: Vec<CandidateArtwork>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            artworks,
        }
    }

    pub fn from_path(name: &str, category: SourceCategory, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let artworks: Vec<CandidateArtwork> = serde_json::from_str(&content)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        Ok(Self::from_artworks(name, category, artworks))
    }

    pub fn len(&self) -> usize {
        self.artworks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artworks.is_empty()
    }
}

/// Count of query tokens hitting an artwork tag (exact or substring either way).
fn overlap(query: &[String], artwork: &CandidateArtwork) -> usize {
    let tags: Vec<String> = artwork
        .keywords
        .iter()
        .map(|k| normalize_match_token(k))
        .filter(|k| !k.is_empty())
        .collect();
    query
        .iter()
        .filter(|q| tags.iter().any(|t| t == *q || t.contains(q.as_str()) || q.contains(t.as_str())))
        .count()
}

#[async_trait]
impl ArtworkSource for CatalogSource {
    async fn search(&self, keywords: &[String], limit: usize) -> Result<SourceQueryResult> {
        let query: Vec<String> = keywords
            .iter()
            .map(|k| normalize_match_token(k))
            .filter(|k| !k.is_empty())
            .collect();

        // No query: browse the head of the catalogue.
        if query.is_empty() {
            let items: Vec<CandidateArtwork> = self.artworks.iter().take(limit).cloned().collect();
            return Ok(SourceQueryResult::ok(&self.name, items, self.artworks.len()));
        }

        let mut hits: Vec<(usize, &CandidateArtwork)> = self
            .artworks
            .iter()
            .map(|a| (overlap(&query, a), a))
            .filter(|(n, _)| *n > 0)
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));

        let total = hits.len();
        let items = hits.into_iter().take(limit).map(|(_, a)| a.clone()).collect();
        Ok(SourceQueryResult::ok(&self.name, items, total))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> SourceCategory {
        self.category
    }
}
