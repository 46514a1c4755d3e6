//! HTTP-facing errors for the chat endpoint
//!
//! Every failure becomes a JSON body `{"error": "..."}`. Upstream details are
//! attached as `details` only in development mode.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use completion::CompletionError;
use thiserror::Error;

/// Generic message shown to clients when the completion request fails.
pub const GENERIC_FAILURE: &str = "Failed to process your request. Please try again later.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Message is required")]
    MissingMessage,

    #[error("Invalid JSON body")]
    InvalidBody,

    #[error("No API keys configured")]
    NoCredentials,

    #[error("Failed to process your request. Please try again later.")]
    Completion {
        cause: CompletionError,
        expose_details: bool,
    },
}

impl ApiError {
    /// Map a completion failure, keeping upstream details only when allowed.
    pub fn from_completion(cause: CompletionError, expose_details: bool) -> Self {
        match cause {
            CompletionError::NoCredentialsConfigured => Self::NoCredentials,
            cause => Self::Completion {
                cause,
                expose_details,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingMessage | Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::NoCredentials | Self::Completion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::Completion {
                cause,
                expose_details: true,
            } => serde_json::json!({
                "error": GENERIC_FAILURE,
                "details": cause.detail(),
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
