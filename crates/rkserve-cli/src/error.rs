//! CLI-specific error types and exit codes.

use rkserve_core::SettingsError;
use rkserve_runtime::EngineConfigError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid server settings.
    #[error("Configuration error: {0}")]
    Config(#[from] SettingsError),

    /// Runtime paths or platform failed validation.
    #[error("Engine configuration error: {0}")]
    Engine(#[from] EngineConfigError),

    /// IO error (bind failure, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("Server error: {0}")]
    Server(#[from] anyhow::Error),
}

impl CliError {
    /// Map error to an exit code.
    ///
    /// Codes follow sysexits.h where one fits.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Engine(_) => 78, // EX_CONFIG
            Self::Io(_) => 74,                       // EX_IOERR
            Self::Server(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(SettingsError::InvalidPort).exit_code(), 78);
        assert_eq!(
            CliError::from(EngineConfigError::ModelNotFound(PathBuf::from("m"))).exit_code(),
            78
        );
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        assert_eq!(CliError::from(io).exit_code(), 74);
        assert_eq!(CliError::from(anyhow::anyhow!("boom")).exit_code(), 1);
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = CliError::from(EngineConfigError::ModelNotFound(PathBuf::from("/m.rkllm")));
        assert_eq!(
            err.to_string(),
            "Engine configuration error: Model file not found: /m.rkllm"
        );
    }
}
