//! Core-level error taxonomy.
//!
//! The Orchestrator never lets a per-field, per-form, per-link, or per-chain
//! failure abort the crawl; only [`CoreError::Fatal`] does. Everything else
//! is downgraded to an [`leakwatch_protocol::ErrorRecord`] and the crawl
//! continues.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing injection bundle or other init-time failure; the only
    /// variant the Orchestrator propagates instead of recording.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Driver(#[from] leakwatch_runtime::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn is_navigation_transient(&self) -> bool {
        matches!(self, CoreError::Driver(e) if e.is_navigation_transient())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Driver(e) if e.is_timeout())
    }
}
