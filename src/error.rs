//! Error types for the turn-detection engine.

/// Top-level error type for the turn-detection engine.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Recognizer helper process or event stream error.
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Response generator collaborator error.
    #[error("generator error: {0}")]
    Generator(String),

    /// Speech synthesizer collaborator error.
    #[error("synthesizer error: {0}")]
    Synthesizer(String),

    /// Playback collaborator error.
    #[error("playback error: {0}")]
    Playback(String),

    /// A collaborator call exceeded the configured timeout.
    #[error("{stage} stage timed out after {timeout_ms}ms")]
    CollaboratorTimeout {
        /// Cascade stage whose collaborator call hung.
        stage: &'static str,
        /// The configured upper bound in milliseconds.
        timeout_ms: u64,
    },

    /// Session lifecycle error (duplicate id, closed session).
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TurnError>;
