//! Test doubles for the inference engine port.
//!
//! Available to this crate's unit tests and, through the `test-utils`
//! feature, to adapter test suites.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::ports::{FragmentStream, GenerationError, InferenceEngine, ReadinessProbe};

/// Engine that replays a fixed list of fragments for every request.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    fragments: Vec<Bytes>,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    fail_to_start: bool,
    state: Arc<EngineState>,
}

#[derive(Debug, Default)]
struct EngineState {
    ready: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new<I, B>(fragments: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let state = EngineState::default();
        state.ready.store(true, Ordering::SeqCst);
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay: None,
            fail_after: None,
            fail_to_start: false,
            state: Arc::new(state),
        }
    }

    /// Sleep before yielding each fragment.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Yield `count` fragments, then a stream error.
    #[must_use]
    pub const fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Refuse to start any generation.
    #[must_use]
    pub const fn failing_to_start(mut self) -> Self {
        self.fail_to_start = true;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    /// Number of generations started.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Generations whose stream is still alive.
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive generations seen.
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Prompt of the most recent generation.
    pub fn last_prompt(&self) -> Option<String> {
        self.state
            .prompts
            .lock()
            .ok()
            .and_then(|prompts| prompts.last().cloned())
    }
}

impl ReadinessProbe for ScriptedEngine {
    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn generate(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.state.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.fail_to_start {
            return Err(GenerationError::StartFailed("scripted start failure".to_string()));
        }

        let guard = ActiveGuard::enter(Arc::clone(&self.state));
        let script = Script {
            fragments: self.fragments.clone(),
            next: 0,
            delay: self.delay,
            fail_after: self.fail_after,
            _guard: guard,
        };

        let stream = futures_util::stream::unfold(script, |mut script| async move {
            if let Some(delay) = script.delay {
                tokio::time::sleep(delay).await;
            }

            if script.fail_after == Some(script.next) {
                script.fail_after = None;
                script.next = script.fragments.len();
                return Some((
                    Err(GenerationError::Stream("scripted stream failure".to_string())),
                    script,
                ));
            }

            let fragment = script.fragments.get(script.next)?.clone();
            script.next += 1;
            Some((Ok(fragment), script))
        });

        Ok(stream.boxed())
    }
}

struct Script {
    fragments: Vec<Bytes>,
    next: usize,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    _guard: ActiveGuard,
}

/// Tracks how many generations are alive at once.
struct ActiveGuard {
    state: Arc<EngineState>,
}

impl ActiveGuard {
    fn enter(state: Arc<EngineState>) -> Self {
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(now, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}
