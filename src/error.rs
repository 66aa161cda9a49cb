//! Error types for the voice-assistant orchestration core.
//!
//! Mirrors the error kinds named in the spec's error-handling design:
//! transport, schema, tool-execution, cancellation, duplicate-call,
//! response-delegation and fatal-startup failures each get a distinct
//! variant so callers can match on failure class rather than string text.

/// Top-level error type for the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum VuiError {
    /// Upstream HTTP transport failed or a stream broke mid-flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// Tool-call arguments were unparsable, or a schema constraint failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// A sandboxed tool invocation failed (non-zero exit, timeout, empty output).
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Root or per-turn cancellation. Swallowed by callers, never logged as an error.
    #[error("cancelled")]
    Cancelled,

    /// CallGuard rejected a repeated call; not a true error, signals the outer
    /// loop to reconcile with the offending tool removed.
    #[error("duplicate call of {0:?}, reconciliation needed")]
    DuplicateCall(String),

    /// An agent tool delegated the turn; the orchestrator should end the
    /// turn without reconciling.
    #[error("response delegated to agent")]
    ResponseDelegated,

    /// Audio I/O, device enumeration, or encode/decode failure.
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice-activity-detection failure.
    #[error("VAD error: {0}")]
    Vad(String),

    /// Configuration parse or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Fatal error during startup (missing config, bad TLS material, bind
    /// failure). Callers should exit with code 1.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for VuiError {
    fn from(e: reqwest::Error) -> Self {
        VuiError::Transport(e.to_string())
    }
}

impl From<hound::Error> for VuiError {
    fn from(e: hound::Error) -> Self {
        VuiError::Audio(e.to_string())
    }
}

impl VuiError {
    /// True for errors that should be swallowed rather than surfaced as a
    /// user-visible error chunk (root/turn cancellation).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VuiError::Cancelled)
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VuiError>;
