// tests/tier_gate.rs
//
// Tier breakpoints and the payment window, through the public TierGate API.

use std::sync::Arc;

use art_recommender::tier::{
    InMemoryPaymentStore, PaymentRecord, PaymentStore, PaymentTier, TierGate, TierName,
};
use chrono::{Duration, Utc};

fn gate(store: Arc<InMemoryPaymentStore>) -> TierGate {
    TierGate::new(store, Duration::hours(24))
}

#[tokio::test]
async fn three_images_are_free_without_any_payment() {
    let g = gate(Arc::new(InMemoryPaymentStore::new()));
    let p = g.check("nobody", 3).await;
    assert!(p.can_analyze);
    assert!(!p.payment_required);
    assert_eq!(p.tier.name, TierName::Free);
}

#[tokio::test]
async fn four_images_without_payment_are_denied() {
    let g = gate(Arc::new(InMemoryPaymentStore::new()));
    let p = g.check("u1", 4).await;
    assert!(!p.can_analyze);
    assert!(p.payment_required);
    assert_eq!(p.tier, PaymentTier::standard());
}

#[tokio::test]
async fn payment_inside_the_window_allows_the_batch() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let now = Utc::now();
    store
        .record_payment(PaymentRecord::completed(
            "u1",
            TierName::Standard,
            now - Duration::hours(23),
        ))
        .await
        .unwrap();

    let p = gate(store).check_at("u1", 4, now).await;
    assert!(p.can_analyze, "23h old payment should still count");
    assert!(p.payment_required);
}

#[tokio::test]
async fn payment_outside_the_window_is_ignored() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let now = Utc::now();
    store
        .record_payment(PaymentRecord::completed(
            "u1",
            TierName::Standard,
            now - Duration::hours(25),
        ))
        .await
        .unwrap();

    let p = gate(store).check_at("u1", 4, now).await;
    assert!(!p.can_analyze, "25h old payment must not count");
}

#[tokio::test]
async fn premium_needs_its_own_payment() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let now = Utc::now();
    store
        .record_payment(PaymentRecord::completed("u1", TierName::Standard, now))
        .await
        .unwrap();

    let g = gate(store);
    assert!(g.check_at("u1", 10, now).await.can_analyze);
    let premium = g.check_at("u1", 11, now).await;
    assert!(!premium.can_analyze);
    assert_eq!(premium.tier.name, TierName::Premium);
}

#[test]
fn tier_table_is_fixed() {
    let all = PaymentTier::all();
    let names: Vec<_> = all.iter().map(|t| t.name).collect();
    assert_eq!(names, vec![TierName::Free, TierName::Standard, TierName::Premium]);
    assert_eq!(all[0].max_images, 3);
    assert_eq!(all[1].max_images, 10);
    assert!(!all[0].requires_payment());
    assert!(all[2].requires_payment());
}
