//! Event and message types passed through the engine.

use crate::collab::{AudioHandle, PlaybackOutcome};
use crate::engine::session::SessionId;
use crate::error::Result;
use std::time::Instant;

/// One transcription update from the recognizer.
///
/// Ephemeral: the engine never stores these. Delivery order per session is
/// the order the recognizer produced them.
#[derive(Debug, Clone)]
pub struct TranscriptionEvent {
    /// The transcribed text so far (possibly empty).
    pub text: String,
    /// Whether the recognizer marked this an utterance boundary.
    pub is_final: bool,
    /// The recognizer's own voice-activity signal (true while the local
    /// synthesis output is audible to the microphone).
    pub is_speaking: bool,
    /// When the engine received this event.
    pub received_at: Instant,
}

impl TranscriptionEvent {
    /// Build an event stamped with the current instant.
    pub fn new(text: impl Into<String>, is_final: bool, is_speaking: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            is_speaking,
            received_at: Instant::now(),
        }
    }
}

/// One stage of the response cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Invoke the response generator.
    Generate,
    /// Invoke the speech synthesizer.
    Synthesize,
    /// Begin playback.
    Play,
}

impl Stage {
    /// Stable lowercase label for logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Synthesize => "synthesize",
            Self::Play => "play",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable engine events, broadcast to subscribers (UI, logging, tests).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A session actor started for a newly opened voice channel.
    SessionOpened {
        /// Session the event belongs to.
        session: SessionId,
    },
    /// A final transcription was accepted and the cascade scheduled.
    UtteranceFinalized {
        /// Session the event belongs to.
        session: SessionId,
        /// The finalized utterance text.
        text: String,
    },
    /// The generate stage fired; the session is now responding.
    ResponseStarted {
        /// Session the event belongs to.
        session: SessionId,
    },
    /// Playback of the synthesized response began.
    PlaybackStarted {
        /// Session the event belongs to.
        session: SessionId,
    },
    /// Playback ran to completion without interruption.
    PlaybackFinished {
        /// Session the event belongs to.
        session: SessionId,
    },
    /// The user barged in; the cascade was torn down.
    Interrupted {
        /// Session the event belongs to.
        session: SessionId,
        /// Whether audio was actively playing when the barge-in arrived.
        was_playing: bool,
    },
    /// A collaborator failed or timed out; the cascade was abandoned for
    /// this utterance. Recoverable: the session is listening again.
    CascadeFailed {
        /// Session the event belongs to.
        session: SessionId,
        /// Stage whose collaborator call failed.
        stage: Stage,
        /// Human-readable failure description.
        error: String,
    },
    /// The recognizer event stream terminated; the session went idle and
    /// the owning channel should be torn down or restarted.
    RecognizerLost {
        /// Session the event belongs to.
        session: SessionId,
    },
    /// The session actor exited.
    SessionClosed {
        /// Session the event belongs to.
        session: SessionId,
    },
}

/// Mailbox messages for one session actor.
///
/// All session mutation happens inside the actor; timers and spawned
/// collaborator calls report back through these, carrying the utterance
/// epoch they were started under so stale work is discarded.
#[derive(Debug)]
pub(crate) enum SessionMsg {
    /// A transcription event arrived from the recognizer.
    Transcription(TranscriptionEvent),
    /// A scheduled stage timer elapsed.
    StageElapsed { stage: Stage, epoch: u64 },
    /// The spawned generator call finished.
    GenerateDone { epoch: u64, result: Result<String> },
    /// The spawned synthesizer call finished.
    SynthesizeDone {
        epoch: u64,
        result: Result<AudioHandle>,
    },
    /// The spawned playback call resolved.
    PlaybackDone {
        epoch: u64,
        result: Result<PlaybackOutcome>,
    },
    /// The recognizer event stream closed unexpectedly.
    RecognizerClosed,
    /// The owning channel is closing the session.
    Close,
}
