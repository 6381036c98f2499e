//! Protocol-specific HTTP error responses.
//!
//! Both surfaces map `ChatError` to the same status codes; only the body
//! shape differs.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use rkserve_core::ChatError;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Seconds a busy client is asked to wait before retrying.
pub const RETRY_AFTER_SECS: u64 = 5;

/// Client-facing message for render and generation failures.
pub const GENERATION_FAILED: &str = "Generation failed";

/// Map an error to an OpenAI-style response.
pub fn openai_error_response(err: &ChatError) -> Response {
    log_error(err);
    let body = match err {
        ChatError::Busy(_) => ErrorResponse::server_busy(),
        ChatError::MalformedRequest(msg) => ErrorResponse::invalid_request(msg.clone()),
        ChatError::Render(_) | ChatError::Generation(_) => {
            ErrorResponse::internal(GENERATION_FAILED)
        }
    };
    with_retry_after(err, (status_of(err), Json(body)).into_response())
}

/// Map an error to an Ollama-style `{"error": message}` response.
pub fn ollama_error_response(err: &ChatError) -> Response {
    log_error(err);
    let message = match err {
        ChatError::Busy(_) | ChatError::MalformedRequest(_) => err.to_string(),
        ChatError::Render(_) | ChatError::Generation(_) => GENERATION_FAILED.to_string(),
    };
    with_retry_after(
        err,
        (status_of(err), Json(ollama_error(&message))).into_response(),
    )
}

/// Build an Ollama-style error JSON object: `{"error": "message"}`.
pub fn ollama_error(msg: &str) -> serde_json::Value {
    serde_json::json!({ "error": msg })
}

fn status_of(err: &ChatError) -> StatusCode {
    StatusCode::from_u16(err.suggested_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn with_retry_after(err: &ChatError, mut response: Response) -> Response {
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
    }
    response
}

fn log_error(err: &ChatError) {
    match err {
        ChatError::Busy(busy) => {
            warn!(waited_ms = busy.waited.as_millis(), "Rejecting request: NPU busy");
        }
        ChatError::MalformedRequest(msg) => warn!("Rejecting malformed request: {msg}"),
        ChatError::Render(_) | ChatError::Generation(_) => error!("Chat request failed: {err}"),
    }
}
