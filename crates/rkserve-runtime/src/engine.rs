//! Inference engine backed by one runtime process per generation.
//!
//! The rendered prompt is written to the child's stdin, and its stdout is
//! streamed back unmodified as fragments. Dropping the fragment stream kills
//! the child.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use rkserve_core::{FragmentStream, GenerationError, InferenceEngine, ReadinessProbe};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::{EngineConfigError, ProcessEngineConfig};

/// Runs the vendor runtime as a child process for each generation.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: Arc<ProcessEngineConfig>,
    running: Arc<AtomicBool>,
}

impl ProcessEngine {
    /// Validate `config` and build the engine.
    pub fn new(config: ProcessEngineConfig) -> Result<Self, EngineConfigError> {
        config.validate()?;
        info!(
            runtime = %config.runtime_bin.display(),
            model = %config.model_path.display(),
            platform = %config.target_platform,
            "Process engine configured"
        );
        Ok(Self {
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ProcessEngineConfig {
        &self.config
    }

    /// True while a child process is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.runtime_bin);
        cmd.args(self.config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl ReadinessProbe for ProcessEngine {
    fn is_ready(&self) -> bool {
        !self.is_running() && self.config.model_path.is_file()
    }
}

#[async_trait]
impl InferenceEngine for ProcessEngine {
    async fn generate(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        if !self.config.model_path.is_file() {
            return Err(GenerationError::NotReady);
        }
        let guard = RunningGuard::acquire(&self.running).ok_or(GenerationError::NotReady)?;

        let mut child = self.command().spawn().map_err(|e| {
            GenerationError::StartFailed(format!(
                "failed to spawn {}: {e}",
                self.config.runtime_bin.display()
            ))
        })?;
        let pid = child.id();
        debug!(?pid, prompt_bytes = prompt.len(), "Spawned runtime process");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenerationError::StartFailed("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::StartFailed("stdout was not captured".to_string()))?;

        spawn_stdin_writer(stdin, prompt.to_owned());
        spawn_stderr_logger(&mut child);

        let timeout = self.config.generation_timeout;
        let state = ChildState {
            stdout: ReaderStream::new(stdout),
            child,
            deadline: timeout.map(|t| Instant::now() + t),
            timeout,
            finished: false,
            _guard: guard,
        };

        Ok(Box::pin(futures_util::stream::unfold(
            state,
            |mut st| async move {
                if st.finished {
                    return None;
                }
                let item = match st.deadline {
                    Some(deadline) => {
                        let read = tokio::time::timeout_at(deadline, st.next_item()).await;
                        match read {
                            Ok(item) => item,
                            Err(_) => Some(Err(st.expire())),
                        }
                    }
                    None => st.next_item().await,
                };
                if !matches!(item, Some(Ok(_))) {
                    st.finished = true;
                }
                item.map(|item| (item, st))
            },
        )))
    }
}

/// Clears the running flag when the generation ends or is dropped.
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// State threaded through the `unfold` stream.
struct ChildState {
    stdout: ReaderStream<ChildStdout>,
    child: Child,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    finished: bool,
    _guard: RunningGuard,
}

impl ChildState {
    async fn next_item(&mut self) -> Option<Result<Bytes, GenerationError>> {
        match self.stdout.next().await {
            Some(Ok(bytes)) => Some(Ok(bytes)),
            Some(Err(e)) => Some(Err(GenerationError::Stream(format!(
                "failed to read runtime output: {e}"
            )))),
            None => match self.child.wait().await {
                Ok(status) if status.success() => {
                    debug!("Runtime process exited cleanly");
                    None
                }
                Ok(status) => Some(Err(exit_error(status))),
                Err(e) => Some(Err(GenerationError::Stream(format!(
                    "failed to wait for runtime: {e}"
                )))),
            },
        }
    }

    fn expire(&mut self) -> GenerationError {
        let limit = self.timeout.unwrap_or_default();
        warn!(?limit, "Generation timed out, killing runtime");
        if let Err(e) = self.child.start_kill() {
            debug!("Failed to kill runtime: {e}");
        }
        GenerationError::TimedOut(limit)
    }
}

fn exit_error(status: ExitStatus) -> GenerationError {
    warn!(%status, "Runtime process failed");
    GenerationError::Stream(format!("runtime exited with {status}"))
}

fn spawn_stdin_writer(mut stdin: ChildStdin, prompt: String) {
    tokio::spawn(async move {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            warn!("Failed to write prompt to runtime: {e}");
            return;
        }
        if let Err(e) = stdin.shutdown().await {
            debug!("Failed to close runtime stdin: {e}");
        }
    });
}

fn spawn_stderr_logger(child: &mut Child) {
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "rkserve_runtime::stderr", "{line}");
            }
            debug!("stderr reader task exiting");
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("rkllm-run");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn engine(dir: &TempDir, body: &str) -> ProcessEngine {
        let model = dir.path().join("model.rkllm");
        std::fs::write(&model, b"weights").unwrap();
        let config = ProcessEngineConfig::new(script(dir.path(), body), model);
        ProcessEngine::new(config).unwrap()
    }

    async fn collect(stream: FragmentStream) -> (Vec<u8>, Option<GenerationError>) {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn test_prompt_is_piped_through() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, "cat");

        let stream = assert_ok!(engine.generate("héllo <think>").await);
        let (out, err) = collect(stream).await;
        assert_eq!(out, "héllo <think>".as_bytes());
        assert!(err.is_none());
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn test_arguments_reach_the_runtime() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, "cat >/dev/null; printf '%s|' \"$@\"");

        let (out, _) = collect(engine.generate("x").await.unwrap()).await;
        let args = String::from_utf8(out).unwrap();
        assert!(args.ends_with("|--target-platform|rk3588|"));
        assert!(args.starts_with(&engine.config().model_path.display().to_string()));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_trailing_error() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, "cat >/dev/null; printf 'partial'; exit 3");

        let (out, err) = collect(engine.generate("x").await.unwrap()).await;
        assert_eq!(out, b"partial");
        assert!(matches!(err, Some(GenerationError::Stream(msg)) if msg.contains("exit")));
    }

    #[tokio::test]
    async fn test_busy_while_running() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, "sleep 5");

        let stream = engine.generate("x").await.unwrap();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.generate("y").await.err().expect("expected Err"),
            GenerationError::NotReady
        ));

        drop(stream);
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn test_timeout_kills_the_runtime() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.rkllm");
        std::fs::write(&model, b"weights").unwrap();
        let config = ProcessEngineConfig::new(script(dir.path(), "printf 'a'; sleep 5"), model)
            .with_generation_timeout(Some(Duration::from_millis(200)));
        let engine = ProcessEngine::new(config).unwrap();

        let (out, err) = collect(engine.generate("x").await.unwrap()).await;
        assert_eq!(out, b"a");
        assert!(matches!(err, Some(GenerationError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_missing_model_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, "cat");
        std::fs::remove_file(&engine.config().model_path).unwrap();

        assert!(!engine.is_ready());
        assert!(matches!(
            engine.generate("x").await,
            Err(GenerationError::NotReady)
        ));
    }
}
