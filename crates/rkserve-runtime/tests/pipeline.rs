//! End-to-end: a scripted runtime process behind the chat service.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use futures_util::StreamExt;
use rkserve_core::{
    AdmissionGate, ChatRequest, ChatService, ConversationMessage, PromptRenderer, SegmentKind,
};
use rkserve_runtime::{ProcessEngine, ProcessEngineConfig};
use tempfile::TempDir;

fn service(dir: &TempDir, body: &str) -> ChatService {
    let bin = dir.path().join("rkllm-run");
    std::fs::write(&bin, format!("#!/bin/sh\ncat >/dev/null\n{body}\n")).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    let model = dir.path().join("model.rkllm");
    std::fs::write(&model, b"weights").unwrap();

    let engine = ProcessEngine::new(ProcessEngineConfig::new(bin, model)).unwrap();
    ChatService::new(Arc::new(engine), PromptRenderer::default())
}

fn ask(text: &str) -> ChatRequest {
    ChatRequest::new(vec![ConversationMessage::user(text)]).with_thinking(true)
}

#[tokio::test]
async fn buffered_completion_parses_runtime_output() {
    let dir = TempDir::new().unwrap();
    let service = service(
        &dir,
        r#"printf '<think>sum</think>'; printf '<tool_call>{"name":"add","arguments":{"a":1}}</tool_call>'"#,
    );
    let gate = AdmissionGate::new();

    let permit = gate.try_acquire().unwrap();
    let completion = service.complete(permit, &ask("1+1?")).await.unwrap();

    assert_eq!(completion.output.thinking.as_deref(), Some("sum"));
    assert_eq!(completion.output.tool_calls.len(), 1);
    assert_eq!(completion.output.tool_calls[0].name, "add");
    assert!(completion.output.content.is_empty());
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn streamed_segments_survive_split_writes() {
    let dir = TempDir::new().unwrap();
    // "é" is written one byte at a time.
    let service = service(
        &dir,
        r"printf '<th'; printf 'ink>hm</th'; printf 'ink>caf'; printf '\303'; printf '\251'",
    );
    let gate = AdmissionGate::new();

    let permit = gate.try_acquire().unwrap();
    let mut segments = service.stream(permit, &ask("coffee")).await.unwrap();
    let mut thinking = String::new();
    let mut content = String::new();
    while let Some(segment) = segments.next().await {
        let segment = segment.unwrap();
        match segment.kind {
            SegmentKind::Thinking => thinking.push_str(&segment.text),
            SegmentKind::Content => content.push_str(&segment.text),
        }
    }
    drop(segments);

    assert_eq!(thinking, "hm");
    assert_eq!(content, "café");
    assert!(!gate.is_busy());
}
