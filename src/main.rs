//! Art recommender binary entrypoint.
//! Boots the Axum HTTP server with config, shared state and the metrics route.

use art_recommender::{config::AppConfig, metrics::Metrics, router, AppState};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - ARTREC_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("ARTREC_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("art_recommender=info,fanout=info,warn"));

    // The platform may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = AppConfig::load_default()?;
    let state = AppState::from_config(&cfg)?;
    let metrics = Metrics::init(state.engine.aggregator().roster_len())?;

    tracing::info!(
        sources = cfg.sources.len(),
        timeout_ms = cfg.fanout.source_timeout_ms,
        dev_hooks = cfg.payment.dev_hooks,
        "art recommender starting"
    );

    let router = router(state).merge(metrics.router());
    Ok(router.into())
}
