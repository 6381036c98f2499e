//! Shared fixtures for rkserve-proxy route tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use rkserve_core::testing::ScriptedEngine;
use rkserve_core::{AdmissionGate, ChatService, PollPolicy, PromptRenderer};
use rkserve_proxy::{ProxyState, ServedModel, create_router};

pub const TEST_MODEL: &str = "qwen3-1.7b";

/// Short poll schedule so busy tests finish quickly.
pub const TEST_POLL: PollPolicy = PollPolicy::new(Duration::from_millis(20), 5);

pub fn state_for(engine: &ScriptedEngine) -> ProxyState {
    let service = ChatService::new(Arc::new(engine.clone()), PromptRenderer::default());
    ProxyState::new(
        service,
        AdmissionGate::new(),
        ServedModel::new(TEST_MODEL),
        TEST_POLL,
    )
}

pub fn app_for(engine: &ScriptedEngine) -> (Router, ProxyState) {
    let state = state_for(engine);
    (create_router(state.clone()), state)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Payloads of every `data:` line of an SSE body.
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|event| event.trim().strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .collect()
}

/// Every object of an NDJSON body.
pub fn ndjson_lines(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
