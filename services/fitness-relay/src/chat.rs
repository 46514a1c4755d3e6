//! Chat endpoint logic
//!
//! Validates the inbound `{ "message": ... }` body, runs one logical
//! completion through the resilient caller and maps the outcome to a JSON
//! response.

use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use completion::ResilientCaller;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::Mode;
use crate::error::ApiError;

/// Shared state passed to the chat handler via axum State extractor
#[derive(Clone)]
pub struct ChatState {
    pub caller: Arc<ResilientCaller>,
    pub mode: Mode,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    message: String,
}

/// Extract the user message. An empty body counts as a missing message.
fn parse_message(body: &[u8]) -> Result<String, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MissingMessage);
    }
    let parsed: ChatBody = serde_json::from_slice(body).map_err(|_| ApiError::InvalidBody)?;
    match parsed.message {
        Some(message) if !message.is_empty() => Ok(message),
        _ => Err(ApiError::MissingMessage),
    }
}

/// Handle one `POST /api/chat` request.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn chat_request(state: &ChatState, body: Bytes, request_id: String) -> Response {
    let started = Instant::now();

    let response = match respond(state, &body).await {
        Ok(reply) => (StatusCode::OK, Json(ChatReply { message: reply })).into_response(),
        Err(err) => {
            warn!(status = err.status().as_u16(), error = %err, "chat request failed");
            err.into_response()
        }
    };

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    crate::metrics::record_request(status, elapsed.as_secs_f64());
    info!(status, elapsed_ms = elapsed.as_millis() as u64, "chat request finished");
    response
}

async fn respond(state: &ChatState, body: &[u8]) -> Result<String, ApiError> {
    let message = parse_message(body)?;
    if state.caller.pool().is_empty() {
        return Err(ApiError::NoCredentials);
    }

    info!(chars = message.chars().count(), "chat request received");
    state
        .caller
        .complete(&message, None)
        .await
        .map_err(|cause| ApiError::from_completion(cause, state.mode.is_development()))
}
