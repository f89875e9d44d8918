// applepay_gateway/src/error.rs
// Gateway error taxonomy and the JSON error body returned at the HTTP edge

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Apple or PayPal answered with a status we do not accept.
    #[error("{context} returned HTTP {status}")]
    Upstream { context: &'static str, status: u16 },

    #[error("identity certificate error: {0}")]
    Identity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid currency: {0}")]
    InvalidCurrency(String),

    /// The row holds no usable amount (null, missing or non-numeric).
    #[error("amount could not be resolved: {0}")]
    UnresolvedAmount(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("row {id} not found in table {table}")]
    RowNotFound { table: String, id: String },

    #[error("formula error: {0}")]
    Formula(String),

    #[error("validation URL rejected: {0}")]
    ValidationUrl(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Status code for errors the caller can fix; `None` means server-side.
    fn client_status(&self) -> Option<StatusCode> {
        match self {
            Self::InvalidAmount(_) | Self::InvalidCurrency(_) | Self::ValidationUrl(_) => {
                Some(StatusCode::BAD_REQUEST)
            }
            Self::RowNotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::UnresolvedAmount(_) => Some(StatusCode::UNPROCESSABLE_ENTITY),
            _ => None,
        }
    }

    /// Converts into an HTTP error. Client-caused errors keep their text,
    /// everything else is logged and answered with `generic`.
    pub fn into_api(self, generic: &str) -> ApiError {
        match self.client_status() {
            Some(status) => ApiError::new(status, self.to_string()),
            None => {
                tracing::error!("{}: {}", generic, self);
                ApiError::internal(generic)
            }
        }
    }
}

/// Error returned from route handlers, rendered as `{ "error": message }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
