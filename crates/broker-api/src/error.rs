//! API error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::CoreError;
use broker_relay::RelayError;
use broker_signer::SignerError;
use broker_telemetry::TelemetryError;
use serde_json::json;
use thiserror::Error;

/// Request handling errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request body.
    #[error("{0}")]
    Validation(String),

    #[error("wrong signature")]
    SignatureMismatch,

    #[error("executor not allowed")]
    ExecutorNotAllowed,

    #[error("error approving token spending")]
    ApprovalFailed,

    #[error("{0}")]
    Signer(#[from] SignerError),

    #[error("{0}")]
    Relay(#[from] RelayError),

    #[error("{0}")]
    Telemetry(#[from] TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl ApiError {
    /// Only validation failures carry an error status; the rest are
    /// reported in a 200 body.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Telemetry(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
