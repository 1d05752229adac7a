// src/config/app.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::sources::SourceCategory;

pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_APP_CONFIG_PATH: &str = "ARTREC_CONFIG_PATH";
/// `ARTREC_ANALYZER=mock` forces the deterministic analyzer regardless of config.
pub const ENV_ANALYZER_OVERRIDE: &str = "ARTREC_ANALYZER";

fn default_timeout_ms() -> u64 {
    4_000
}
fn default_per_source_limit() -> usize {
    20
}
fn default_top_keywords() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_window_hours() -> i64 {
    24
}
fn default_history_capacity() -> usize {
    2_000
}
fn default_checkout_base_url() -> String {
    "https://pay.example.com/checkout".to_string()
}
fn default_analysis_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    #[serde(default = "default_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_per_source_limit")]
    pub per_source_limit: usize,
    /// How many common keywords are sent to sources (1..=10).
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,
    #[serde(default = "default_true")]
    pub include_korean: bool,
    #[serde(default = "default_true")]
    pub include_student_art: bool,
    #[serde(default = "default_true")]
    pub include_international: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_timeout_ms(),
            per_source_limit: default_per_source_limit(),
            top_keywords: default_top_keywords(),
            include_korean: true,
            include_student_art: true,
            include_international: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerProvider {
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub provider: AnalyzerProvider,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// "ENV" means: read from VISION_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::Mock,
            endpoint: None,
            api_key: None,
            timeout_ms: default_analysis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_checkout_base_url")]
    pub checkout_base_url: String,
    /// How long a completed payment unlocks its tier.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    /// Mounts `POST /payments/complete` (dev stand-in for the processor webhook).
    #[serde(default)]
    pub dev_hooks: bool,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: default_checkout_base_url(),
            window_hours: default_window_hours(),
            dev_hooks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Catalog,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub category: SourceCategory,
    /// Catalog file (kind = "catalog").
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Search endpoint (kind = "http").
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AppConfig {
    /// Parse + sanitize a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&data)
            .with_context(|| format!("parsing app config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $ARTREC_CONFIG_PATH (must exist)
    /// 2) config/app.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_APP_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_APP_CONFIG_PATH} points to non-existent path");
            }
            return Self::load_from_file(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_APP_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from_file(&fallback);
        }
        Ok(Self::default().sanitized())
    }

    fn sanitized(mut self) -> Self {
        if self.fanout.source_timeout_ms == 0 {
            self.fanout.source_timeout_ms = default_timeout_ms();
        }
        if self.fanout.per_source_limit == 0 {
            self.fanout.per_source_limit = default_per_source_limit();
        }
        self.fanout.top_keywords = self.fanout.top_keywords.clamp(1, 10);
        if self.payment.window_hours <= 0 {
            self.payment.window_hours = default_window_hours();
        }
        if self.analysis.timeout_ms == 0 {
            self.analysis.timeout_ms = default_analysis_timeout_ms();
        }
        if std::env::var(ENV_ANALYZER_OVERRIDE).is_ok_and(|v| v.eq_ignore_ascii_case("mock")) {
            self.analysis.provider = AnalyzerProvider::Mock;
        }
        // Resolve api key if "ENV"
        if self
            .analysis
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("env"))
        {
            self.analysis.api_key = std::env::var("VISION_API_KEY").ok();
        }
        self
    }
}
