//! Runtime command configuration and startup validation.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Runtime wrapper looked up on `PATH` when no binary is configured.
pub const DEFAULT_RUNTIME_BIN: &str = "rkllm-run";

/// Rockchip SoC the model was converted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetPlatform {
    #[default]
    Rk3588,
    Rk3576,
}

impl TargetPlatform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rk3588 => "rk3588",
            Self::Rk3576 => "rk3576",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetPlatform {
    type Err = EngineConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rk3588" => Ok(Self::Rk3588),
            "rk3576" => Ok(Self::Rk3576),
            _ => Err(EngineConfigError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Errors found while validating a [`ProcessEngineConfig`].
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("Runtime binary not found: {0}")]
    RuntimeNotFound(PathBuf),

    #[error("Runtime binary is not executable: {0}")]
    RuntimeNotExecutable(PathBuf),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("LoRA model file not found: {0}")]
    LoraNotFound(PathBuf),

    #[error("Prompt cache file not found: {0}")]
    PromptCacheNotFound(PathBuf),

    #[error("Unknown target platform '{0}' (expected rk3588 or rk3576)")]
    UnknownPlatform(String),

    #[error("Generation timeout must be greater than zero")]
    ZeroTimeout,
}

/// How to launch one generation of the vendor runtime.
#[derive(Debug, Clone)]
pub struct ProcessEngineConfig {
    /// Runtime wrapper; a bare name is resolved through `PATH`.
    pub runtime_bin: PathBuf,
    pub model_path: PathBuf,
    pub target_platform: TargetPlatform,
    pub lora_model_path: Option<PathBuf>,
    pub prompt_cache_path: Option<PathBuf>,
    /// Passed through verbatim after the built-in arguments.
    pub extra_args: Vec<String>,
    /// Wall-clock limit for one generation. `None` means unbounded.
    pub generation_timeout: Option<Duration>,
}

impl ProcessEngineConfig {
    pub fn new(runtime_bin: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            runtime_bin: runtime_bin.into(),
            model_path: model_path.into(),
            target_platform: TargetPlatform::default(),
            lora_model_path: None,
            prompt_cache_path: None,
            extra_args: Vec::new(),
            generation_timeout: None,
        }
    }

    #[must_use]
    pub const fn with_target_platform(mut self, platform: TargetPlatform) -> Self {
        self.target_platform = platform;
        self
    }

    #[must_use]
    pub fn with_lora_model_path(mut self, path: Option<PathBuf>) -> Self {
        self.lora_model_path = path;
        self
    }

    #[must_use]
    pub fn with_prompt_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.prompt_cache_path = path;
        self
    }

    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    #[must_use]
    pub const fn with_generation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Command-line arguments for the runtime, in launch order.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            self.model_path.clone().into_os_string(),
            "--target-platform".into(),
            self.target_platform.as_str().into(),
        ];
        if let Some(lora) = &self.lora_model_path {
            args.push("--lora-model-path".into());
            args.push(lora.clone().into_os_string());
        }
        if let Some(cache) = &self.prompt_cache_path {
            args.push("--prompt-cache-path".into());
            args.push(cache.clone().into_os_string());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Check every configured path before the server starts.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        validate_runtime_bin(&self.runtime_bin)?;

        if !self.model_path.is_file() {
            return Err(EngineConfigError::ModelNotFound(self.model_path.clone()));
        }
        if let Some(lora) = &self.lora_model_path
            && !lora.exists()
        {
            return Err(EngineConfigError::LoraNotFound(lora.clone()));
        }
        if let Some(cache) = &self.prompt_cache_path
            && !cache.exists()
        {
            return Err(EngineConfigError::PromptCacheNotFound(cache.clone()));
        }
        if self.generation_timeout.is_some_and(|t| t.is_zero()) {
            return Err(EngineConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

fn validate_runtime_bin(path: &Path) -> Result<(), EngineConfigError> {
    // Bare names are resolved by the OS at spawn time.
    if path.components().count() <= 1 && !path.is_absolute() {
        return Ok(());
    }

    if !path.is_file() {
        return Err(EngineConfigError::RuntimeNotFound(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let executable = path
            .metadata()
            .is_ok_and(|metadata| metadata.permissions().mode() & 0o111 != 0);
        if !executable {
            return Err(EngineConfigError::RuntimeNotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}
