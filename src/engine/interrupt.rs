//! Barge-in detection and teardown.
//!
//! The single decision point for "is this a barge-in?", evaluated on every
//! transcription event regardless of finality. The teardown ordering is a
//! contract: timers are cancelled and the cache cleared before playback is
//! stopped, so a stage callback already mid-flight can never observe stale
//! artifacts, and the playback stop is issued even when only playback is
//! outstanding.

use crate::collab::AudioSink;
use crate::engine::messages::TranscriptionEvent;
use crate::engine::session::{Phase, SessionState};
use tracing::{info, warn};

/// What one transcription event means for the responding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterruptDecision {
    /// Empty or whitespace-only text, never an interruption.
    Silent,
    /// Ordinary dictation: the session is not responding.
    Dictation,
    /// The user barged in on an in-flight response.
    BargeIn,
}

pub(crate) struct InterruptionController;

impl InterruptionController {
    /// Classify an incoming event against the session's responding flag.
    pub(crate) fn classify(
        session: &SessionState,
        event: &TranscriptionEvent,
    ) -> InterruptDecision {
        if event.text.trim().is_empty() {
            InterruptDecision::Silent
        } else if !session.is_responding {
            InterruptDecision::Dictation
        } else {
            InterruptDecision::BargeIn
        }
    }

    /// Tear down the in-flight response. Returns whether audio was playing.
    ///
    /// By the time this returns, no future stage for the aborted utterance
    /// will execute: timers are cancelled, the epoch is bumped so already
    /// dispatched callbacks fail their liveness check, and playback is
    /// stopped. The session is left indistinguishable from one that never
    /// started responding.
    pub(crate) async fn interrupt(session: &mut SessionState, playback: &dyn AudioSink) -> bool {
        session.phase = Phase::Interrupted;

        let cancelled = session.timers.cancel_all();
        session.epoch += 1;
        session.cache.clear();

        let was_playing = session.is_playing;
        if was_playing {
            if let Err(e) = playback.stop().await {
                warn!(session = %session.id, "playback stop failed during barge-in: {e}");
            }
            session.is_playing = false;
        }

        session.is_responding = false;
        session.phase = Phase::Listening;
        info!(
            session = %session.id,
            cancelled_timers = cancelled,
            was_playing,
            "barge-in: response torn down"
        );
        was_playing
    }
}
