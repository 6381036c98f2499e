//! Axum HTTP server for the OpenAI- and Ollama-compatible surfaces.
//!
//! This module provides the `serve()` function that runs the server on a
//! pre-bound `TcpListener`, and the OpenAI route handlers.

use std::path::Path;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use rkserve_core::{
    AdmissionGate, AdmissionPolicy, ChatError, ChatRequest, ChatService, PollPolicy,
    ReadinessProbe,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::openai_error_response;
use crate::models::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ErrorResponse, ModelsResponse,
    ResponseMessage, Usage, finish_reason,
};
use crate::ollama_handlers::{ollama_chat, ollama_root, ollama_tags, ollama_version};
use crate::sse::{ChunkContext, stream_completion, stream_segments};

/// The single model served by this process.
#[derive(Debug, Clone)]
pub struct ServedModel {
    /// Identifier reported to clients.
    pub id: String,
    /// Model file size in bytes (0 if unknown).
    pub size: u64,
    /// Unix timestamp reported as the model's creation time.
    pub created: i64,
}

impl ServedModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            size: 0,
            created: chrono::Utc::now().timestamp(),
        }
    }

    /// Describe the model at `path`, using file metadata where available.
    pub fn from_file(id: impl Into<String>, path: &Path) -> Self {
        let mut model = Self::new(id);
        if let Ok(metadata) = std::fs::metadata(path) {
            model.size = metadata.len();
            if let Some(created) = metadata
                .modified()
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from)
            {
                model.created = created.timestamp();
            }
        }
        model
    }

    /// Creation time in RFC 3339, as Ollama lists it.
    pub fn modified_at(&self) -> String {
        chrono::DateTime::from_timestamp(self.created, 0)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

/// Shared server state, injected via Axum `State`.
///
/// Used by both the OpenAI (`/v1/`) and Ollama (`/api/`) route trees.
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub service: ChatService,
    pub gate: AdmissionGate,
    pub model: ServedModel,
    /// Admission schedule for the Ollama surface.
    pub poll: PollPolicy,
}

impl ProxyState {
    pub fn new(service: ChatService, gate: AdmissionGate, model: ServedModel, poll: PollPolicy) -> Self {
        Self {
            service,
            gate,
            model,
            poll,
        }
    }
}

/// Build the router with every route, CORS allow-all and request tracing.
pub fn create_router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/rkllm_chat/v1/models", get(list_models))
        .route("/rkllm_chat/v1/chat/completions", post(chat_completions))
        .route("/", get(ollama_root))
        .route("/api/version", get(ollama_version))
        .route("/api/tags", get(ollama_tags))
        .route("/api/chat", post(ollama_chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server with a pre-bound listener.
///
/// Runs until the cancellation token is triggered.
///
/// # Errors
///
/// Returns an error if the listener address cannot be read or the server
/// fails.
pub async fn serve(
    listener: TcpListener,
    state: ProxyState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(model = %state.model.id, "Server starting on {addr}");

    let app = create_router(state);

    info!("OpenAI API: http://{addr}/v1");
    info!("Ollama API: http://{addr}/api");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Server shut down");
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse<'a> {
    status: &'static str,
    model: &'a str,
    ready: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<ProxyState>) -> impl IntoResponse {
    let status = if state.gate.is_busy() { "busy" } else { "idle" };
    Json(HealthResponse {
        status,
        model: &state.model.id,
        ready: state.service.is_ready(),
    })
    .into_response()
}

/// List the served model in OpenAI format.
async fn list_models(State(state): State<ProxyState>) -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(ModelsResponse::single(&state.model.id, state.model.created))
}

/// Handle chat completions.
///
/// Admission is non-blocking: a busy NPU answers 503 immediately.
async fn chat_completions(State(state): State<ProxyState>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_request(format!(
                    "Invalid request body: {e}"
                ))),
            )
                .into_response();
        }
    };

    if request.messages.is_empty() {
        return openai_error_response(&ChatError::MalformedRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let tools = request.tools.unwrap_or_default();
    info!(
        model = request.model.as_deref().unwrap_or(&state.model.id),
        streaming = request.stream,
        think = request.think,
        tools = tools.len(),
        "Processing chat completion request"
    );

    let permit = match state
        .gate
        .admit(&AdmissionPolicy::NonBlocking, &state.service)
        .await
    {
        Ok(permit) => permit,
        Err(busy) => return openai_error_response(&ChatError::from(busy)),
    };

    let chat = ChatRequest::new(request.messages)
        .with_tools(tools)
        .with_thinking(request.think);
    let ctx = ChunkContext::new(&state.model.id);

    if request.stream && !chat.has_tools() {
        return match state.service.stream(permit, &chat).await {
            Ok(segments) => stream_segments(segments, ctx).into_response(),
            Err(e) => openai_error_response(&e),
        };
    }

    let completion = match state.service.complete(permit, &chat).await {
        Ok(completion) => completion,
        Err(e) => return openai_error_response(&e),
    };

    if request.stream {
        return stream_completion(&completion, &ctx).into_response();
    }

    Json(ChatCompletionResponse {
        id: ctx.id,
        object: "chat.completion".to_string(),
        created: ctx.created,
        model: ctx.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ResponseMessage::from(&completion.output),
            finish_reason: finish_reason(&completion.output).to_string(),
        }],
        usage: Usage::from_fragments(completion.fragments),
    })
    .into_response()
}
