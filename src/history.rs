//! history.rs: audit trail of assembled responses (persistence collaborator).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::assemble::RecommendationResponse;
use crate::sources::CapabilityFlags;
use crate::tier::TierName;

/// What was asked, minus the image bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequestSummary {
    pub user_id: String,
    pub image_count: usize,
    pub limit: usize,
    pub tier: TierName,
    pub flags: CapabilityFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub batch_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub request: BatchRequestSummary,
    pub response: RecommendationResponse,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(
        &self,
        batch_id: Uuid,
        request: &BatchRequestSummary,
        response: &RecommendationResponse,
    ) -> Result<()>;

    /// Newest first.
    async fn list_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>>;
}

pub type DynHistoryStore = Arc<dyn HistoryStore>;

/// Bounded in-memory store; oldest entries are dropped past `cap`.
#[derive(Debug)]
pub struct InMemoryHistory {
    inner: Mutex<Vec<HistoryEntry>>,
    cap: usize,
}

impl InMemoryHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 100_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn save(
        &self,
        batch_id: Uuid,
        request: &BatchRequestSummary,
        response: &RecommendationResponse,
    ) -> Result<()> {
        let entry = HistoryEntry {
            batch_id,
            saved_at: Utc::now(),
            request: request.clone(),
            response: response.clone(),
        };

        let mut v = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("history mutex poisoned"))?;
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        Ok(())
    }

    async fn list_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let v = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("history mutex poisoned"))?;
        Ok(v.iter()
            .rev()
            .filter(|e| e.request.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{AssemblyInput, ResultAssembler};
    use crate::keywords::CommonKeywords;

    fn response() -> RecommendationResponse {
        ResultAssembler.assemble(AssemblyInput {
            batch_id: Uuid::new_v4(),
            tier: TierName::Free,
            image_results: vec![],
            analysis_failures: 0,
            common_keywords: CommonKeywords::default(),
            ranked: vec![],
            source_results: vec![],
            total_candidates: 0,
            excluded_count: 0,
            limit: 10,
            processing_time_ms: 1,
        })
    }

    fn req(user: &str) -> BatchRequestSummary {
        BatchRequestSummary {
            user_id: user.into(),
            image_count: 1,
            limit: 10,
            tier: TierName::Free,
            flags: CapabilityFlags::default(),
        }
    }

    #[tokio::test]
    async fn lists_newest_first_per_user() {
        let h = InMemoryHistory::with_capacity(10);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        h.save(ids[0], &req("u1"), &response()).await.unwrap();
        h.save(ids[1], &req("u2"), &response()).await.unwrap();
        h.save(ids[2], &req("u1"), &response()).await.unwrap();

        let rows = h.list_history("u1", 10).await.unwrap();
        let got: Vec<Uuid> = rows.iter().map(|e| e.batch_id).collect();
        assert_eq!(got, vec![ids[2], ids[0]]);
        assert_eq!(h.list_history("u1", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drops_oldest_past_capacity() {
        let h = InMemoryHistory::with_capacity(2);
        for _ in 0..5 {
            h.save(Uuid::new_v4(), &req("u"), &response()).await.unwrap();
        }
        assert_eq!(h.len(), 2);
    }
}
