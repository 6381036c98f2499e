//! Command-line arguments.
//!
//! Every option can also be set through an `RKSERVE_*` environment variable
//! (or a `.env` file loaded before parsing).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rkserve_core::{
    DEFAULT_HOST, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, Settings,
};
use rkserve_runtime::{DEFAULT_RUNTIME_BIN, TargetPlatform};

/// Serve a Rockchip NPU model over OpenAI- and Ollama-compatible HTTP APIs.
#[derive(Debug, Parser)]
#[command(name = "rkserve")]
#[command(version, about)]
pub struct Cli {
    /// Converted model file to load
    #[arg(long, env = "RKSERVE_MODEL_PATH")]
    pub model_path: PathBuf,

    /// SoC the model was converted for
    #[arg(long, env = "RKSERVE_TARGET_PLATFORM", default_value_t = TargetPlatform::Rk3588)]
    pub target_platform: TargetPlatform,

    /// LoRA adapter to apply
    #[arg(long, env = "RKSERVE_LORA_MODEL_PATH")]
    pub lora_model_path: Option<PathBuf>,

    /// Prompt cache file to load
    #[arg(long, env = "RKSERVE_PROMPT_CACHE_PATH")]
    pub prompt_cache_path: Option<PathBuf>,

    /// Runtime wrapper executable
    #[arg(long, env = "RKSERVE_RUNTIME_BIN", default_value = DEFAULT_RUNTIME_BIN)]
    pub runtime_bin: PathBuf,

    /// Extra argument passed to the runtime (repeatable)
    #[arg(long = "runtime-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,

    /// Kill a generation after this many seconds
    #[arg(long, env = "RKSERVE_GENERATION_TIMEOUT_SECS")]
    pub generation_timeout_secs: Option<u64>,

    /// Address to bind
    #[arg(long, env = "RKSERVE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "RKSERVE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Model name reported to clients (defaults to the model file stem)
    #[arg(long, env = "RKSERVE_MODEL_NAME")]
    pub model_name: Option<String>,

    /// Delay between admission attempts on /api/chat, in milliseconds
    #[arg(long, env = "RKSERVE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Admission attempts on /api/chat before answering busy
    #[arg(long, env = "RKSERVE_POLL_ATTEMPTS", default_value_t = DEFAULT_POLL_ATTEMPTS)]
    pub poll_attempts: u32,

    /// Directory for images decoded from requests (system temp by default)
    #[arg(long, env = "RKSERVE_IMAGE_DIR")]
    pub image_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Server settings carried by these arguments.
    pub fn settings(&self) -> Settings {
        Settings {
            host: Some(self.host.clone()),
            port: Some(self.port),
            model_name: self.model_name.clone(),
            poll_interval_ms: Some(self.poll_interval_ms),
            poll_attempts: Some(self.poll_attempts),
            image_dir: self.image_dir.clone(),
            ..Settings::with_defaults()
        }
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["rkserve", "--model-path", "/models/qwen3.rkllm"]);
        assert_eq!(cli.model_path, PathBuf::from("/models/qwen3.rkllm"));
        assert_eq!(cli.target_platform, TargetPlatform::Rk3588);
        assert_eq!(cli.runtime_bin, PathBuf::from(DEFAULT_RUNTIME_BIN));
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 8080);
        assert!(cli.generation_timeout().is_none());
        assert!(!cli.verbose);

        let settings = cli.settings();
        assert_eq!(settings.effective_port(), 8080);
        assert_eq!(settings.poll_policy().ceiling(), Duration::from_secs(10));
    }

    #[test]
    fn test_all_options() {
        let cli = Cli::parse_from([
            "rkserve",
            "--model-path",
            "m.rkllm",
            "--target-platform",
            "rk3576",
            "--lora-model-path",
            "lora.rkllm",
            "--prompt-cache-path",
            "cache.bin",
            "--runtime-bin",
            "/opt/rkllm/run",
            "--runtime-arg",
            "--max-new-tokens",
            "--runtime-arg",
            "256",
            "--generation-timeout-secs",
            "90",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--model-name",
            "qwen",
            "--poll-interval-ms",
            "100",
            "--poll-attempts",
            "3",
            "-v",
        ]);

        assert_eq!(cli.target_platform, TargetPlatform::Rk3576);
        assert_eq!(cli.lora_model_path, Some(PathBuf::from("lora.rkllm")));
        assert_eq!(cli.prompt_cache_path, Some(PathBuf::from("cache.bin")));
        assert_eq!(cli.runtime_args, ["--max-new-tokens", "256"]);
        assert_eq!(cli.generation_timeout(), Some(Duration::from_secs(90)));
        assert!(cli.verbose);

        let settings = cli.settings();
        assert_eq!(settings.effective_host(), "127.0.0.1");
        assert_eq!(settings.effective_port(), 9000);
        assert_eq!(settings.model_name.as_deref(), Some("qwen"));
        assert_eq!(settings.poll_policy().ceiling(), Duration::from_millis(300));
    }

    #[test]
    fn test_rejects_unknown_platform() {
        let result = Cli::try_parse_from([
            "rkserve",
            "--model-path",
            "m.rkllm",
            "--target-platform",
            "rk3399",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_model_path_is_required() {
        assert!(Cli::try_parse_from(["rkserve"]).is_err());
    }
}
