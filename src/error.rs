use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("missing evidence: {0}")]
    MissingEvidence(String),

    #[error("reorder partially applied: {} position update(s) failed", .failed.len())]
    ReorderPartial {
        applied: Vec<Uuid>,
        failed: Vec<Uuid>,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": self.to_string() }))
            }
            AppError::MissingEvidence(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": format!("missing evidence: {msg}") }),
            ),
            AppError::ReorderPartial { applied, failed } => (
                StatusCode::MULTI_STATUS,
                json!({
                    "error": self.to_string(),
                    "applied": applied,
                    "failed": failed,
                }),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
