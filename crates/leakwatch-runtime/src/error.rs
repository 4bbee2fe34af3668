//! Error types for the browser driver facade.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a browser.
///
/// The `is_*` predicates let the orchestrator dispatch on error category
/// rather than matching variants directly, so new transient-error variants
/// can be added without touching call sites.
#[derive(Debug, Error)]
pub enum Error {
    /// The browser process could not be launched.
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    /// The CDP websocket connection dropped or could not be established.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// A CDP command returned a protocol-level error.
    #[error("CDP protocol error: {0}")]
    Protocol(String),

    /// The frame was detached before or during the operation.
    #[error("frame detached: {0}")]
    FrameDetached(String),

    /// The execution context the operation targeted was destroyed (typically
    /// by a navigation racing with the call).
    #[error("execution context destroyed: {0}")]
    ContextDestroyed(String),

    /// The page, context, or browser was closed mid-operation.
    #[error("target closed: {target_type}: {context}")]
    TargetClosed { target_type: String, context: String },

    /// The session (CDP session, driver connection) was closed.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// An operation exceeded its deadline.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Navigation specifically timed out.
    #[error("navigation timeout after {duration_ms}ms navigating to '{url}'")]
    NavigationTimeout { url: String, duration_ms: u64 },

    /// No element matched the selector (or selector chain hop).
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A JS evaluation threw or failed to deserialize.
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    /// I/O error (e.g. reading a streamed network resource).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument supplied to a facade method.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Navigation-transient errors: detached frame, destroyed execution
    /// context, session/target closed. These are logged and never propagated
    /// by the orchestrator.
    pub fn is_navigation_transient(&self) -> bool {
        matches!(
            self,
            Error::FrameDetached(_)
                | Error::ContextDestroyed(_)
                | Error::TargetClosed { .. }
                | Error::SessionClosed(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::NavigationTimeout { .. })
    }

    pub fn is_target_closed(&self) -> bool {
        matches!(self, Error::TargetClosed { .. } | Error::SessionClosed(_))
    }
}
