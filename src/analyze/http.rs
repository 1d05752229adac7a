//! Vision endpoint client: POSTs raw image bytes, expects a JSON descriptor set
//! (`keywords`, `colors`, `style`, `mood`, `confidence`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{ImageAnalysisResult, ImageAnalyzer};

pub struct HttpVisionAnalyzer {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpVisionAnalyzer {
    /// `api_key` is sent as a bearer token when present.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("art-recommender/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building vision http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ImageAnalyzer for HttpVisionAnalyzer {
    async fn analyze(&self, image: &[u8]) -> Result<ImageAnalysisResult> {
        let mut req = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("vision http post")?;
        let resp = resp.error_for_status().context("vision http status")?;
        let body: ImageAnalysisResult = resp.json().await.context("decoding vision response")?;
        Ok(body.sanitized())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
