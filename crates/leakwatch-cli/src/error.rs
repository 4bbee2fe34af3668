//! CLI-level error type: wraps config loading, browser launch, and the core
//! engine's own [`leakwatch::CoreError`] into one enum the `main` can match
//! on for exit codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error(transparent)]
    Core(#[from] leakwatch::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
