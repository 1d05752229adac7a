// src/sources/http.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sources::{ArtworkSource, CandidateArtwork, SourceCategory, SourceQueryResult};

/// Remote JSON search endpoint.
///
/// Request:  `POST {endpoint}` with `{"keywords": [...], "limit": N}`
/// Response: `{"success": bool?, "artworks": [...], "total": N?, "error": "..."?}`
pub struct HttpSource {
    name: String,
    category: SourceCategory,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SearchReq<'a> {
    keywords: &'a [String],
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResp {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    artworks: Vec<CandidateArtwork>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl HttpSource {
    /// `timeout` is the client-level cap; the aggregator applies its own too.
    pub fn new(name: &str, category: SourceCategory, endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("art-recommender/0.1")
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()
            .context("building source http client")?;
        Ok(Self {
            name: name.to_string(),
            category,
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl ArtworkSource for HttpSource {
    async fn search(&self, keywords: &[String], limit: usize) -> Result<SourceQueryResult> {
        let resp = match self
            .client
            .post(&self.endpoint)
            .json(&SearchReq { keywords, limit })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.name, "source http error");
                return Err(e).context("source http post");
            }
        };
        let body: SearchResp = resp
            .error_for_status()
            .context("source http status")?
            .json()
            .await
            .context("decoding source response")?;

        if !body.success {
            return Ok(SourceQueryResult::failed(
                &self.name,
                body.error.unwrap_or_else(|| "source reported failure".to_string()),
            ));
        }
        let mut artworks = body.artworks;
        artworks.truncate(limit);
        let total = body.total.unwrap_or(artworks.len());
        Ok(SourceQueryResult::ok(&self.name, artworks, total))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> SourceCategory {
        self.category
    }
}
