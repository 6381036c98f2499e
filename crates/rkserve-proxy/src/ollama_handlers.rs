//! Ollama-native API route handlers.
//!
//! These handlers accept Ollama-format requests and answer in Ollama
//! format, so Ollama clients can talk to the NPU directly. Admission on
//! this surface waits on a bounded poll instead of failing immediately.

use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use rkserve_core::{AdmissionPolicy, ChatError, ChatRequest, ConversationMessage};
use tracing::{debug, info};

use crate::error::{ollama_error, ollama_error_response};
use crate::ollama_models::{
    OLLAMA_COMPAT_VERSION, OLLAMA_ROOT_RESPONSE, OllamaChatMessage, OllamaChatRequest,
    OllamaChatResponse, OllamaTagsResponse, OllamaVersionResponse, elapsed_nanos,
    normalize_model_name, now_rfc3339,
};
use crate::ollama_stream::{single_line_response, stream_chat_response};
use crate::server::ProxyState;

// ── GET / ──────────────────────────────────────────────────────────────

/// Ollama root route: plain-text `"Ollama is running"`.
pub(crate) async fn ollama_root() -> impl IntoResponse {
    OLLAMA_ROOT_RESPONSE
}

// ── GET /api/version ───────────────────────────────────────────────────

pub(crate) async fn ollama_version() -> impl IntoResponse {
    Json(OllamaVersionResponse {
        version: OLLAMA_COMPAT_VERSION.to_string(),
    })
}

// ── GET /api/tags ──────────────────────────────────────────────────────

pub(crate) async fn ollama_tags(State(state): State<ProxyState>) -> impl IntoResponse {
    debug!("GET /api/tags");
    Json(OllamaTagsResponse::single(
        &state.model.id,
        state.model.size,
        &state.model.modified_at(),
    ))
}

// ── POST /api/chat ─────────────────────────────────────────────────────

pub(crate) async fn ollama_chat(State(state): State<ProxyState>, body: Bytes) -> Response {
    let req: OllamaChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ollama_error(&e.to_string()))).into_response();
        }
    };

    let messages = match req
        .messages
        .into_iter()
        .map(|m| m.into_conversation_message())
        .collect::<Result<Vec<ConversationMessage>, _>>()
    {
        Ok(messages) if !messages.is_empty() => messages,
        Ok(_) => {
            return ollama_error_response(&ChatError::MalformedRequest(
                "messages must not be empty".to_string(),
            ));
        }
        Err(e) => return ollama_error_response(&ChatError::MalformedRequest(e.to_string())),
    };

    let requested = normalize_model_name(&req.model);
    let tools = req.tools.unwrap_or_default();
    info!(
        model = if requested.is_empty() { state.model.id.as_str() } else { requested },
        streaming = req.stream,
        think = req.think,
        tools = tools.len(),
        "POST /api/chat"
    );

    let start = Instant::now();
    let policy = AdmissionPolicy::BoundedPoll(state.poll);
    let permit = match state.gate.admit(&policy, &state.service).await {
        Ok(permit) => permit,
        Err(busy) => return ollama_error_response(&ChatError::from(busy)),
    };

    let chat = ChatRequest::new(messages)
        .with_tools(tools)
        .with_thinking(req.think);
    let model = state.model.id.clone();

    if req.stream && !chat.has_tools() {
        return match state.service.stream(permit, &chat).await {
            Ok(segments) => stream_chat_response(segments, model, start),
            Err(e) => ollama_error_response(&e),
        };
    }

    let completion = match state.service.complete(permit, &chat).await {
        Ok(completion) => completion,
        Err(e) => return ollama_error_response(&e),
    };

    let response = OllamaChatResponse {
        model,
        created_at: now_rfc3339(),
        message: OllamaChatMessage::from(&completion.output),
        done: true,
        done_reason: "stop".to_string(),
        total_duration: elapsed_nanos(start),
        eval_count: u32::try_from(completion.fragments).unwrap_or(u32::MAX),
    };

    if req.stream {
        single_line_response(&response)
    } else {
        Json(response).into_response()
    }
}
