use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};

use crate::assemble::RecommendationResponse;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::history::{DynHistoryStore, HistoryEntry, InMemoryHistory};
use crate::pipeline::{BatchRequest, RecommendationEngine, DEFAULT_LIMIT};
use crate::sources::CapabilityFlags;
use crate::tier::{DynPaymentStore, InMemoryPaymentStore, PaymentRecord, PaymentTier, TierName};

/// Upload cap for one multipart batch.
const BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;
const USER_HEADER: &str = "x-user-id";
const ANONYMOUS: &str = "anonymous";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub payments: DynPaymentStore,
    pub history: DynHistoryStore,
    pub default_flags: CapabilityFlags,
    pub dev_hooks: bool,
}

impl AppState {
    /// In-memory stores + engine wired from config.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let payments: DynPaymentStore = Arc::new(InMemoryPaymentStore::new());
        let history: DynHistoryStore = Arc::new(InMemoryHistory::with_capacity(cfg.history.capacity));
        let engine = RecommendationEngine::from_config(cfg, payments.clone(), history.clone())?;
        Ok(Self {
            engine: Arc::new(engine),
            payments,
            history,
            default_flags: CapabilityFlags {
                include_korean: cfg.fanout.include_korean,
                include_student_art: cfg.fanout.include_student_art,
                include_international: cfg.fanout.include_international,
            },
            dev_hooks: cfg.payment.dev_hooks,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/analyze", post(analyze))
        .route("/tiers", get(tiers))
        .route("/history", get(history));
    if state.dev_hooks {
        r = r.route("/payments/complete", post(complete_payment));
    }
    r.layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// A panic anywhere below the router becomes the generic 500 body.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    PipelineError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Pull images and options out of the multipart body. Empty image parts are skipped.
async fn read_batch(
    headers: &HeaderMap,
    mut multipart: Multipart,
    defaults: CapabilityFlags,
) -> Result<BatchRequest, PipelineError> {
    let mut images: Vec<Vec<u8>> = Vec::new();
    let mut user_field: Option<String> = None;
    let mut limit = DEFAULT_LIMIT;
    let mut flags = defaults;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "malformed multipart body");
                return Err(PipelineError::validation("malformed multipart body"));
            }
        };
        let name = field.name().unwrap_or("").to_string();
        let is_image = matches!(name.as_str(), "image" | "images" | "images[]" | "file")
            || (name.is_empty() && field.file_name().is_some());

        let bytes = field
            .bytes()
            .await
            .map_err(|_| PipelineError::validation(format!("could not read field '{name}'")))?;

        if is_image {
            if !bytes.is_empty() {
                images.push(bytes.to_vec());
            }
            continue;
        }

        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        match name.as_str() {
            "user_id" if !text.is_empty() => user_field = Some(text),
            "limit" => {
                limit = text
                    .parse::<usize>()
                    .map_err(|_| PipelineError::validation("limit must be a positive integer"))?;
            }
            "include_korean" => flags.include_korean = parse_flag(&text).unwrap_or(flags.include_korean),
            "include_student_art" => {
                flags.include_student_art = parse_flag(&text).unwrap_or(flags.include_student_art)
            }
            "include_international" => {
                flags.include_international = parse_flag(&text).unwrap_or(flags.include_international)
            }
            _ => {}
        }
    }

    let user_id = user_from_headers(headers)
        .or(user_field)
        .unwrap_or_else(|| ANONYMOUS.to_string());

    Ok(BatchRequest {
        user_id,
        images,
        limit,
        flags,
    })
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<RecommendationResponse>, PipelineError> {
    let req = read_batch(&headers, multipart, state.default_flags).await?;
    let resp = state.engine.recommend(req).await?;
    Ok(Json(resp))
}

async fn tiers() -> Json<Vec<PaymentTier>> {
    Json(PaymentTier::all())
}

#[derive(serde::Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, PipelineError> {
    let user_id = user_from_headers(&headers)
        .or(q.user_id)
        .ok_or_else(|| PipelineError::validation("user_id is required"))?;
    let limit = q.limit.unwrap_or(10).clamp(1, 50);
    let rows = state.history.list_history(&user_id, limit).await?;
    Ok(Json(rows))
}

#[derive(serde::Deserialize)]
struct CompletePaymentReq {
    user_id: String,
    tier: TierName,
}

async fn complete_payment(
    State(state): State<AppState>,
    Json(body): Json<CompletePaymentReq>,
) -> Result<(StatusCode, Json<PaymentRecord>), PipelineError> {
    if body.user_id.trim().is_empty() {
        return Err(PipelineError::validation("user_id is required"));
    }
    let record = PaymentRecord::completed(body.user_id.trim(), body.tier, Utc::now());
    state.payments.record_payment(record.clone()).await?;
    tracing::info!(tier = body.tier.as_str(), "payment recorded via dev hook");
    Ok((StatusCode::CREATED, Json(record)))
}
