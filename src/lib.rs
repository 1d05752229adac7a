// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod assemble;
pub mod config;
pub mod error;
pub mod history;
pub mod keywords;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod ranking;
pub mod sources;
pub mod tier;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::PipelineError;
pub use crate::pipeline::{BatchRequest, EngineSettings, RecommendationEngine};
