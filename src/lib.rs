//! Sylph: turn-detection and barge-in engine for real-time voice
//! conversations.
//!
//! Sylph decides, from a stream of speech-recognition events, *when* a user
//! has finished speaking, *when* to begin generating a response, and *how*
//! to abort that response instantly if the user resumes speaking. The race
//! between "user speaking" and "system responding" always resolves in the
//! user's favor.
//!
//! # Architecture
//!
//! Each voice channel gets one session actor owning all of its state:
//! - **Recognizer adapter**: supervises the helper subprocess and turns its
//!   line-delimited JSON into typed [`TranscriptionEvent`]s
//! - **Turn-detection engine**: the per-session state machine
//!   (`Idle → Listening → SilenceDetected → Responding`)
//! - **Timer cascade**: chained generate → synthesize → play stages, each
//!   gated by a cancellable delay
//! - **Interruption controller**: tears the cascade down the instant a
//!   non-empty transcription arrives mid-response
//! - **Collaborators**: response generation, synthesis, and playback are
//!   trait seams ([`collab`]); sylph never produces audio itself

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod recognizer;

pub use collab::{
    AudioHandle, AudioSink, ConversationTurn, PlaybackOutcome, ResponseGenerator,
    SpeechSynthesizer, TurnContext,
};
pub use config::EngineConfig;
pub use engine::{EngineEvent, Phase, SessionHandle, SessionId, Stage, TranscriptionEvent, TurnEngine};
pub use error::{Result, TurnError};
pub use recognizer::RecognizerSupervisor;
