//! # Tier Gate
//! Maps a batch size to a pricing tier and decides whether the batch may run.
//!
//! - free: ≤3 images, always allowed, no store lookup.
//! - standard: ≤10 images, paid.
//! - premium: >10 images (up to [`MAX_BATCH_IMAGES`]), paid.
//!
//! Paid tiers need a completed payment for the same user and tier created
//! within the payment window (24h by default). If the store cannot be
//! reached the gate denies: it never fails open.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Hard cap on images per batch.
pub const MAX_BATCH_IMAGES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Free,
    Standard,
    Premium,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Free => "free",
            TierName::Standard => "standard",
            TierName::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTier {
    pub name: TierName,
    pub max_images: usize,
    /// USD; 0 means no payment record is needed.
    pub price: f32,
    pub description: String,
}

impl PaymentTier {
    pub fn free() -> Self {
        Self {
            name: TierName::Free,
            max_images: 3,
            price: 0.0,
            description: "Up to 3 images per batch, no payment required.".to_string(),
        }
    }

    pub fn standard() -> Self {
        Self {
            name: TierName::Standard,
            max_images: 10,
            price: 4.99,
            description: "Up to 10 images per batch.".to_string(),
        }
    }

    pub fn premium() -> Self {
        Self {
            name: TierName::Premium,
            max_images: MAX_BATCH_IMAGES,
            price: 9.99,
            description: format!("Up to {MAX_BATCH_IMAGES} images per batch."),
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::free(), Self::standard(), Self::premium()]
    }

    /// Fixed breakpoints: ≤3 free, ≤10 standard, otherwise premium.
    pub fn for_count(n: usize) -> Self {
        if n <= 3 {
            Self::free()
        } else if n <= 10 {
            Self::standard()
        } else {
            Self::premium()
        }
    }

    pub fn requires_payment(&self) -> bool {
        self.price > 0.0
    }
}

/// Derived per request; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPermission {
    pub can_analyze: bool,
    pub payment_required: bool,
    pub tier: PaymentTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub user_id: String,
    pub tier: TierName,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn completed(user_id: impl Into<String>, tier: TierName, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier,
            status: PaymentStatus::Completed,
            created_at,
        }
    }
}

/// Permission/payment store. The write path belongs to the payment processor.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Has `user_id` a completed payment for `tier` created at or after `since`?
    async fn has_completed_payment(
        &self,
        user_id: &str,
        tier: TierName,
        since: DateTime<Utc>,
    ) -> Result<bool>;

    async fn record_payment(&self, record: PaymentRecord) -> Result<()>;
}

pub type DynPaymentStore = Arc<dyn PaymentStore>;

#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    inner: Mutex<Vec<PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn has_completed_payment(
        &self,
        user_id: &str,
        tier: TierName,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let v = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("payment store mutex poisoned"))?;
        Ok(v.iter().any(|r| {
            r.user_id == user_id
                && r.tier == tier
                && r.status == PaymentStatus::Completed
                && r.created_at >= since
        }))
    }

    async fn record_payment(&self, record: PaymentRecord) -> Result<()> {
        let mut v = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("payment store mutex poisoned"))?;
        v.push(record);
        Ok(())
    }
}

/// Builds the opaque payment-initiation handle returned with a denial.
#[derive(Debug, Clone)]
pub struct CheckoutLinks {
    base_url: String,
}

impl CheckoutLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn payment_url(&self, user_id: &str, tier: &PaymentTier) -> String {
        format!(
            "{}?tier={}&ref={}",
            self.base_url.trim_end_matches('/'),
            tier.name.as_str(),
            anon_hash(user_id)
        )
    }
}

/// Short, stable hash of an identity for logs and opaque handles.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct TierGate {
    store: DynPaymentStore,
    window: Duration,
}

impl TierGate {
    pub fn new(store: DynPaymentStore, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn check(&self, user_id: &str, image_count: usize) -> AnalysisPermission {
        self.check_at(user_id, image_count, Utc::now()).await
    }

    /// Same as [`check`](Self::check) with an explicit "now".
    pub async fn check_at(
        &self,
        user_id: &str,
        image_count: usize,
        now: DateTime<Utc>,
    ) -> AnalysisPermission {
        let tier = PaymentTier::for_count(image_count);
        if !tier.requires_payment() {
            return AnalysisPermission {
                can_analyze: true,
                payment_required: false,
                tier,
            };
        }

        let since = now - self.window;
        let paid = match self
            .store
            .has_completed_payment(user_id, tier.name, since)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    user = %anon_hash(user_id),
                    tier = tier.name.as_str(),
                    "payment store unavailable; denying paid tier"
                );
                false
            }
        };

        if !paid {
            counter!("payment_denied_total", "tier" => tier.name.as_str()).increment(1);
        }

        AnalysisPermission {
            can_analyze: paid,
            payment_required: true,
            tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownStore;

    #[async_trait]
    impl PaymentStore for DownStore {
        async fn has_completed_payment(&self, _: &str, _: TierName, _: DateTime<Utc>) -> Result<bool> {
            anyhow::bail!("connection refused")
        }
        async fn record_payment(&self, _: PaymentRecord) -> Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn gate_with(records: Vec<PaymentRecord>) -> TierGate {
        let store = InMemoryPaymentStore {
            inner: Mutex::new(records),
        };
        TierGate::new(Arc::new(store), Duration::hours(24))
    }

    #[test]
    fn breakpoints() {
        assert_eq!(PaymentTier::for_count(1).name, TierName::Free);
        assert_eq!(PaymentTier::for_count(3).name, TierName::Free);
        assert_eq!(PaymentTier::for_count(4).name, TierName::Standard);
        assert_eq!(PaymentTier::for_count(10).name, TierName::Standard);
        assert_eq!(PaymentTier::for_count(11).name, TierName::Premium);
    }

    #[tokio::test]
    async fn free_tier_skips_the_store() {
        let gate = TierGate::new(Arc::new(DownStore), Duration::hours(24));
        let p = gate.check("u1", 3).await;
        assert!(p.can_analyze);
        assert!(!p.payment_required);
    }

    #[tokio::test]
    async fn paid_tier_fails_closed_when_store_is_down() {
        let gate = TierGate::new(Arc::new(DownStore), Duration::hours(24));
        let p = gate.check("u1", 4).await;
        assert!(!p.can_analyze);
        assert!(p.payment_required);
    }

    #[tokio::test]
    async fn payment_must_match_user_tier_and_status() {
        let now = Utc::now();
        let gate = gate_with(vec![
            PaymentRecord::completed("other", TierName::Standard, now),
            PaymentRecord::completed("u1", TierName::Premium, now),
            PaymentRecord {
                user_id: "u1".into(),
                tier: TierName::Standard,
                status: PaymentStatus::Pending,
                created_at: now,
            },
        ]);
        assert!(!gate.check_at("u1", 5, now).await.can_analyze);
        assert!(gate.check_at("u1", 12, now).await.can_analyze);
    }

    #[test]
    fn payment_url_hides_identity() {
        let links = CheckoutLinks::new("https://pay.test/checkout/");
        let url = links.payment_url("alice@example.com", &PaymentTier::standard());
        assert!(url.starts_with("https://pay.test/checkout?tier=standard&ref="));
        assert!(!url.contains("alice"));
    }
}
