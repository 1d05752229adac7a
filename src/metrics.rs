use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder, describe every series and
    /// publish the roster size. Call once per process.
    pub fn init(configured_sources: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        // Descriptions go to the installed recorder, so this must follow install.
        describe();
        gauge!("sources_configured").set(configured_sources as f64);

        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("analysis_failures_total", "Per-image analysis failures.");
    describe_counter!("source_failures_total", "Source queries that failed or timed out.");
    describe_counter!("source_timeouts_total", "Source queries cut by the per-source timeout.");
    describe_counter!("policy_excluded_total", "Candidates removed by the content policy.");
    describe_counter!("persistence_failures_total", "History writes that failed.");
    describe_counter!("payment_denied_total", "Batches denied by the tier gate.");
    describe_counter!("batches_total", "Batches that completed the pipeline.");
    describe_histogram!("pipeline_duration_ms", "End-to-end batch time in milliseconds.");
    describe_gauge!("sources_configured", "Artwork sources in the configured roster.");
}
