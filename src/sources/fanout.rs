// src/sources/fanout.rs
//! Parallel fan-out / fan-in over the source roster.
//!
//! Every active source gets exactly one query, bounded by a per-source timeout.
//! All queries settle before the pool is merged; a failure, timeout or panic
//! only empties that source's own contribution. The futures live inside the caller's
//! future, so dropping the request cancels whatever is still pending.

use futures::future::join_all;
use futures::FutureExt;
use metrics::counter;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::sources::{
    CandidateArtwork, CapabilityFlags, DynArtworkSource, SourceCategory, SourceQueryResult,
};

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0:#}")]
    Failed(anyhow::Error),
    #[error("panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run every task concurrently, each under `timeout`, and wait for all of them.
/// Output order matches input order; one task's failure or panic never cancels another.
pub async fn settle_all<T, F, I>(tasks: I, timeout: Duration) -> Vec<Result<T, SettleError>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = anyhow::Result<T>>,
{
    join_all(tasks.into_iter().map(|task| async move {
        match tokio::time::timeout(timeout, AssertUnwindSafe(task).catch_unwind()).await {
            Ok(Ok(Ok(v))) => Ok(v),
            Ok(Ok(Err(e))) => Err(SettleError::Failed(e)),
            Ok(Err(payload)) => Err(SettleError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(SettleError::TimedOut(timeout)),
        }
    }))
    .await
}

/// Merged result of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanoutOutcome {
    /// True once the fan-out itself completed, whatever individual sources did.
    pub success: bool,
    /// One entry per dispatched source, in roster order.
    pub results: Vec<SourceQueryResult>,
    /// Concatenation of every result's artworks, tagged with `source_name`.
    pub candidates: Vec<CandidateArtwork>,
}

impl FanoutOutcome {
    pub fn failed_sources(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

pub struct SourceFanoutAggregator {
    roster: Vec<DynArtworkSource>,
    timeout: Duration,
    per_source_limit: usize,
}

impl SourceFanoutAggregator {
    pub fn new(roster: Vec<DynArtworkSource>, timeout: Duration, per_source_limit: usize) -> Self {
        Self {
            roster,
            timeout,
            per_source_limit: per_source_limit.max(1),
        }
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// Names + categories of the configured roster (diagnostics).
    pub fn roster(&self) -> Vec<(String, SourceCategory)> {
        self.roster
            .iter()
            .map(|s| (s.name().to_string(), s.category()))
            .collect()
    }

    pub async fn fan_out(&self, keywords: &[String], flags: CapabilityFlags) -> FanoutOutcome {
        let active: Vec<&DynArtworkSource> = self
            .roster
            .iter()
            .filter(|s| flags.allows(s.category()))
            .collect();

        let t0 = Instant::now();
        let limit = self.per_source_limit;
        let settled = settle_all(
            active.iter().map(|src| src.search(keywords, limit)),
            self.timeout,
        )
        .await;

        let mut outcome = FanoutOutcome {
            success: true,
            results: Vec::with_capacity(active.len()),
            candidates: Vec::new(),
        };

        for (src, res) in active.iter().zip(settled) {
            let name = src.name().to_string();
            let result = match res {
                Ok(r) if r.success => {
                    let mut r = r;
                    r.source_name = name.clone();
                    for a in r.artworks.iter_mut() {
                        a.source_name = name.clone();
                    }
                    r
                }
                Ok(r) => {
                    let msg = r.error.unwrap_or_else(|| "source reported failure".to_string());
                    tracing::warn!(source = %name, error = %msg, "source returned success=false");
                    counter!("source_failures_total", "source" => name.clone()).increment(1);
                    SourceQueryResult::failed(&name, msg)
                }
                Err(e) => {
                    if matches!(e, SettleError::TimedOut(_)) {
                        counter!("source_timeouts_total").increment(1);
                    }
                    tracing::warn!(source = %name, error = %e, "source query failed");
                    counter!("source_failures_total", "source" => name.clone()).increment(1);
                    SourceQueryResult::failed(&name, e.to_string())
                }
            };
            outcome.candidates.extend(result.artworks.iter().cloned());
            outcome.results.push(result);
        }

        tracing::info!(
            target: "fanout",
            dispatched = outcome.results.len(),
            failed = outcome.failed_sources(),
            candidates = outcome.candidates.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "source fan-out settled"
        );

        outcome
    }
}
