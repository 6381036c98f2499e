//! Settings domain types and validation.
//!
//! Pure configuration values; the CLI fills them from arguments and the
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gate::PollPolicy;
use crate::prompt::{ChatTemplate, ImageStore};

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 8080;

/// Default delay between admission attempts on the Ollama surface.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default number of admission attempts on the Ollama surface.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Server settings.
///
/// All fields are optional to support partial configuration and graceful
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Address to bind.
    pub host: Option<String>,

    /// Port to bind.
    pub port: Option<u16>,

    /// Model identifier reported to clients, overriding the file stem.
    pub model_name: Option<String>,

    /// Delay between bounded-poll admission attempts, in milliseconds.
    pub poll_interval_ms: Option<u64>,

    /// Number of bounded-poll admission attempts.
    pub poll_attempts: Option<u32>,

    /// Directory under which inline images are written (system temp if unset).
    pub image_dir: Option<PathBuf>,

    /// Turn-opening delimiter of the chat template.
    pub turn_start: Option<String>,

    /// Turn-closing delimiter of the chat template.
    pub turn_end: Option<String>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        let template = ChatTemplate::default();
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            model_name: None,
            poll_interval_ms: Some(DEFAULT_POLL_INTERVAL_MS),
            poll_attempts: Some(DEFAULT_POLL_ATTEMPTS),
            image_dir: None,
            turn_start: Some(template.turn_start),
            turn_end: Some(template.turn_end),
        }
    }

    #[must_use]
    pub fn effective_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None => DEFAULT_PORT,
        }
    }

    /// Model identifier: the override if set, else the model file stem.
    #[must_use]
    pub fn effective_model_name(&self, model_path: &Path) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| model_id_from_path(model_path))
    }

    /// Retry schedule for bounded-poll admission.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS)),
            self.poll_attempts.unwrap_or(DEFAULT_POLL_ATTEMPTS),
        )
    }

    /// Chat template, falling back to ChatML delimiters.
    #[must_use]
    pub fn chat_template(&self) -> ChatTemplate {
        let defaults = ChatTemplate::default();
        ChatTemplate::new(
            self.turn_start.clone().unwrap_or(defaults.turn_start),
            self.turn_end.clone().unwrap_or(defaults.turn_end),
        )
    }

    #[must_use]
    pub fn image_store(&self) -> ImageStore {
        ImageStore::new(self.image_dir.clone())
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Port must be non-zero")]
    InvalidPort,

    #[error("Poll interval must be at least 1 ms")]
    InvalidPollInterval,

    #[error("Poll attempts must be at least 1")]
    InvalidPollAttempts,

    #[error("Model name cannot be empty")]
    EmptyModelName,

    #[error("Chat template delimiters cannot be empty")]
    EmptyTemplateDelimiter,

    #[error("Image directory does not exist: {0}")]
    MissingImageDir(PathBuf),
}

/// Validate settings values.
///
/// # Errors
///
/// Returns the first invalid value found.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.port == Some(0) {
        return Err(SettingsError::InvalidPort);
    }

    if settings.poll_interval_ms == Some(0) {
        return Err(SettingsError::InvalidPollInterval);
    }

    if settings.poll_attempts == Some(0) {
        return Err(SettingsError::InvalidPollAttempts);
    }

    if settings
        .model_name
        .as_ref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(SettingsError::EmptyModelName);
    }

    if [&settings.turn_start, &settings.turn_end]
        .into_iter()
        .flatten()
        .any(String::is_empty)
    {
        return Err(SettingsError::EmptyTemplateDelimiter);
    }

    if let Some(dir) = &settings.image_dir
        && !dir.is_dir()
    {
        return Err(SettingsError::MissingImageDir(dir.clone()));
    }

    Ok(())
}

/// Model identifier derived from a model file: its name without extension.
#[must_use]
pub fn model_id_from_path(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map_or_else(
            || path.to_string_lossy().into_owned(),
            |stem| stem.to_string_lossy().into_owned(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.effective_host(), "0.0.0.0");
        assert_eq!(settings.effective_port(), 8080);
        assert_eq!(settings.poll_policy(), PollPolicy::default());
        assert_eq!(settings.chat_template(), ChatTemplate::default());
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_empty_settings_fall_back() {
        let settings = Settings::default();
        assert_eq!(settings.effective_host(), DEFAULT_HOST);
        assert_eq!(settings.effective_port(), DEFAULT_PORT);
        assert_eq!(settings.poll_policy().ceiling(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"port": 9090}"#).unwrap();
        assert_eq!(settings.effective_port(), 9090);
        assert_eq!(settings.effective_host(), DEFAULT_HOST);
    }

    #[test]
    fn test_model_name_override_and_stem() {
        let path = Path::new("/models/Qwen3-1.7B-w8a8-rk3588.rkllm");
        let mut settings = Settings::default();
        assert_eq!(settings.effective_model_name(path), "Qwen3-1.7B-w8a8-rk3588");

        settings.model_name = Some("qwen3".to_string());
        assert_eq!(settings.effective_model_name(path), "qwen3");
    }

    #[test]
    fn test_model_id_without_extension() {
        assert_eq!(model_id_from_path(Path::new("model")), "model");
        assert_eq!(model_id_from_path(Path::new("a/b/c.d.rkllm")), "c.d");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            (
                Settings {
                    port: Some(0),
                    ..Settings::default()
                },
                SettingsError::InvalidPort,
            ),
            (
                Settings {
                    poll_interval_ms: Some(0),
                    ..Settings::default()
                },
                SettingsError::InvalidPollInterval,
            ),
            (
                Settings {
                    poll_attempts: Some(0),
                    ..Settings::default()
                },
                SettingsError::InvalidPollAttempts,
            ),
            (
                Settings {
                    model_name: Some("  ".to_string()),
                    ..Settings::default()
                },
                SettingsError::EmptyModelName,
            ),
            (
                Settings {
                    turn_end: Some(String::new()),
                    ..Settings::default()
                },
                SettingsError::EmptyTemplateDelimiter,
            ),
        ];

        for (settings, expected) in cases {
            assert_eq!(validate_settings(&settings), Err(expected));
        }
    }

    #[test]
    fn test_image_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings {
            image_dir: Some(dir.path().to_path_buf()),
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_ok());

        settings.image_dir = Some(dir.path().join("missing"));
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::MissingImageDir(_))
        ));
    }
}
