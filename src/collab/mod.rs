//! Outbound collaborator contracts.
//!
//! The engine never generates, synthesizes, or plays anything itself; it
//! decides *when*. These traits are the seams where real implementations
//! (LLM client, TTS engine, audio device) plug in. New collaborators only
//! need to implement one trait.

use crate::error::{Result, TurnError};
use async_trait::async_trait;
use std::time::Duration;

/// One completed conversation exchange, kept as generator context.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// What the user said.
    pub user_text: String,
    /// What the assistant replied.
    pub assistant_text: String,
}

/// Context handed to the response generator for one turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// The finalized utterance that triggered this turn.
    pub utterance: String,
    /// Prior completed exchanges in this session, oldest first.
    pub history: Vec<ConversationTurn>,
}

/// Opaque reference to synthesized audio, understood by the playback sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    /// Sink-specific reference (buffer id, file path, stream handle…).
    pub reference: String,
}

/// How an active playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The audio played to the end.
    Completed,
    /// Playback was aborted by [`AudioSink::stop`].
    Stopped,
}

/// Response generation contract.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply for the given turn. Implementations may stream
    /// internally; the engine only needs the completed text.
    async fn generate(&self, ctx: &TurnContext) -> Result<String>;
}

/// Speech synthesis contract.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and return a reference to the resulting audio.
    async fn synthesize(&self, text: &str) -> Result<AudioHandle>;
}

/// Playback device contract.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Begin playback and resolve when it finishes or is stopped.
    ///
    /// At most one playback is active per session; the engine enforces this
    /// before calling.
    async fn start(&self, audio: AudioHandle) -> Result<PlaybackOutcome>;

    /// Stop the active playback. Must be a no-op when nothing is playing.
    async fn stop(&self) -> Result<()>;
}

/// Wrap a collaborator call with the configured upper-bound timeout.
///
/// A timeout is reported as a collaborator failure, not left to hang: a
/// hung call would block the session's next legitimate cascade.
pub(crate) async fn with_timeout<T>(
    stage: &'static str,
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TurnError::CollaboratorTimeout {
            stage,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
