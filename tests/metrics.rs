// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file owns it: one test
// installs it, runs a batch and checks the exposition text.

use std::sync::Arc;

use art_recommender::analyze::MockAnalyzer;
use art_recommender::history::InMemoryHistory;
use art_recommender::metrics::Metrics;
use art_recommender::sources::{
    CandidateArtwork, CapabilityFlags, CatalogSource, DynArtworkSource, SourceCategory,
};
use art_recommender::tier::InMemoryPaymentStore;
use art_recommender::{BatchRequest, EngineSettings, RecommendationEngine};

#[tokio::test]
async fn batch_series_reach_the_exporter() {
    let metrics = Metrics::init(1).expect("install recorder");

    let source: DynArtworkSource = Arc::new(CatalogSource::from_artworks(
        "local",
        SourceCategory::Core,
        vec![CandidateArtwork {
            id: "w1".into(),
            title: "Blue Valley".into(),
            artist: "Anon".into(),
            keywords: vec!["landscape".into()],
            source_name: String::new(),
            metadata: Default::default(),
        }],
    ));
    let engine = RecommendationEngine::new(
        Arc::new(MockAnalyzer::new()),
        vec![source],
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(InMemoryHistory::with_capacity(10)),
        EngineSettings::default(),
    );

    engine
        .recommend(BatchRequest {
            user_id: "u1".into(),
            // second image is empty, so one analysis failure is recorded too
            images: vec![b"sunset.png".to_vec(), Vec::new()],
            limit: 10,
            flags: CapabilityFlags::default(),
        })
        .await
        .expect("free batch runs");

    let text = metrics.handle.render();
    assert!(text.contains("# HELP batches_total"), "HELP line missing:\n{text}");
    assert!(text.contains("batches_total 1"), "counter missing:\n{text}");
    assert!(text.contains("analysis_failures_total 1"), "failure counter missing:\n{text}");
    assert!(text.contains("pipeline_duration_ms"), "histogram missing:\n{text}");
    assert!(text.contains("sources_configured 1"), "gauge missing:\n{text}");
}
