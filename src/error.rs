//! Pipeline error taxonomy and its HTTP mapping.
//!
//! Only `Validation` and `PermissionDenied` short-circuit a batch. Analysis,
//! source and persistence failures are absorbed further down and never reach here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::tier::PaymentTier;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 400: nothing to analyze, too many images, malformed upload.
    #[error("invalid request: {0}")]
    Validation(String),

    /// 402: paid tier without a recent completed payment.
    #[error("payment required for tier '{}'", .tier.name.as_str())]
    PermissionDenied {
        tier: PaymentTier,
        payment_url: String,
    },

    /// 500: anything else. The cause is logged, never returned.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::PermissionDenied { .. } => StatusCode::PAYMENT_REQUIRED,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            PipelineError::Validation(msg) => json!({
                "error": { "code": "VALIDATION_ERROR", "message": msg }
            }),
            PipelineError::PermissionDenied { tier, payment_url } => json!({
                "error": {
                    "code": "PAYMENT_REQUIRED",
                    "message": format!("payment required for tier '{}'", tier.name.as_str()),
                },
                "tier": tier,
                "paymentUrl": payment_url,
            }),
            PipelineError::Internal(err) => {
                tracing::error!(error = ?err, "internal pipeline error");
                json!({
                    "error": { "code": "INTERNAL_ERROR", "message": "internal error" }
                })
            }
        };
        (status, Json(body)).into_response()
    }
}
