//! Per-session mutable state.
//!
//! A [`SessionState`] is owned by exactly one actor task; nothing here is
//! shared or locked. Timers and spawned collaborator calls interact with it
//! only through the session mailbox.

use crate::collab::{AudioHandle, ConversationTurn};
use crate::engine::messages::{Stage, TranscriptionEvent};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque per-channel session identifier. Never reused across channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline phase of one session.
///
/// ```text
/// Idle → Listening → SilenceDetected → Responding ─┬→ Listening
///                ↑                                 │
///                └──────── Interrupted ←───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No recognizer stream attached (channel not open, or stream lost).
    Idle,
    /// Receiving transcription events; no response in flight.
    Listening,
    /// A final event arrived; the cascade is counting down to generate.
    SilenceDetected,
    /// The generate stage fired; a response is being produced or played.
    Responding,
    /// A barge-in is being torn down. Transient; immediately re-enters
    /// `Listening`.
    Interrupted,
}

/// Cancellation tokens for the scheduled stage timers.
///
/// The cascade is chained, so at most one slot is occupied at a time.
#[derive(Debug, Default)]
pub(crate) struct StageTimers {
    generate: Option<CancellationToken>,
    synthesize: Option<CancellationToken>,
    play: Option<CancellationToken>,
}

impl StageTimers {
    fn slot_mut(&mut self, stage: Stage) -> &mut Option<CancellationToken> {
        match stage {
            Stage::Generate => &mut self.generate,
            Stage::Synthesize => &mut self.synthesize,
            Stage::Play => &mut self.play,
        }
    }

    /// Number of timers currently counting down.
    pub(crate) fn live_count(&self) -> usize {
        [&self.generate, &self.synthesize, &self.play]
            .into_iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Store the token for a newly scheduled stage.
    pub(crate) fn set(&mut self, stage: Stage, token: CancellationToken) {
        let slot = self.slot_mut(stage);
        assert!(
            slot.is_none(),
            "stage timer '{stage}' scheduled while already live"
        );
        *slot = Some(token);
    }

    /// Release a stage's slot (after its timer fired or was cancelled).
    pub(crate) fn take(&mut self, stage: Stage) -> Option<CancellationToken> {
        self.slot_mut(stage).take()
    }

    /// Cancel every live timer. Returns how many were cancelled.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for stage in [Stage::Generate, Stage::Synthesize, Stage::Play] {
            if let Some(token) = self.slot_mut(stage).take() {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

/// Cached stage artifacts for the in-flight utterance.
///
/// Entries are produced once per utterance and replaced only wholesale when
/// a new utterance begins or an interruption clears them.
#[derive(Debug, Default)]
pub(crate) struct StageCache {
    /// Generated response text.
    pub(crate) generate: Option<String>,
    /// Reference to synthesized audio.
    pub(crate) synthesize: Option<AudioHandle>,
}

impl StageCache {
    pub(crate) fn clear(&mut self) {
        self.generate = None;
        self.synthesize = None;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.generate.is_none() && self.synthesize.is_none()
    }
}

/// Mutable record for one conversation/voice channel.
#[derive(Debug)]
pub(crate) struct SessionState {
    /// Channel identifier.
    pub(crate) id: SessionId,
    /// Current pipeline phase.
    pub(crate) phase: Phase,
    /// Scheduled stage timers.
    pub(crate) timers: StageTimers,
    /// Cached stage artifacts.
    pub(crate) cache: StageCache,
    /// True from first-stage scheduling until playback completes or the
    /// cascade is aborted. The single guard the interruption decision
    /// consults.
    pub(crate) is_responding: bool,
    /// True only while the playback device is actively outputting audio.
    pub(crate) is_playing: bool,
    /// Utterance generation counter. Incremented whenever in-flight work
    /// becomes stale; timers and collaborator completions carry the epoch
    /// they were started under.
    pub(crate) epoch: u64,
    /// The finalized utterance the current cascade is responding to.
    pub(crate) utterance: String,
    /// Completed exchanges, oldest first, passed to the generator.
    pub(crate) history: Vec<ConversationTurn>,
}

impl SessionState {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            phase: Phase::Listening,
            timers: StageTimers::default(),
            cache: StageCache::default(),
            is_responding: false,
            is_playing: false,
            epoch: 0,
            utterance: String::new(),
            history: Vec::new(),
        }
    }

    /// Whether work started under `epoch` is still current.
    pub(crate) fn is_live(&self, epoch: u64) -> bool {
        self.is_responding && epoch == self.epoch
    }

    /// A redelivered copy of the final event that started the in-flight
    /// cascade. Dropped before the barge-in guard so duplicate delivery
    /// stays idempotent.
    pub(crate) fn is_duplicate_final(&self, event: &TranscriptionEvent) -> bool {
        event.is_final && self.is_responding && event.text.trim() == self.utterance
    }

    /// Start a fresh cascade for `utterance`: bump the epoch, clear the
    /// previous utterance's artifacts, and mark the session responding.
    pub(crate) fn begin_utterance(&mut self, utterance: &str) {
        self.epoch += 1;
        self.utterance = utterance.to_owned();
        self.cache.clear();
        self.is_responding = true;
        self.phase = Phase::SilenceDetected;
    }

    /// Invalidate any in-flight work and return to listening.
    pub(crate) fn reset_to_listening(&mut self) {
        self.epoch += 1;
        self.timers.cancel_all();
        self.cache.clear();
        self.is_responding = false;
        self.is_playing = false;
        self.phase = Phase::Listening;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str, is_final: bool) -> TranscriptionEvent {
        TranscriptionEvent::new(text, is_final, false)
    }

    #[test]
    fn begin_utterance_bumps_epoch_and_clears_cache() {
        let mut session = SessionState::new(SessionId::new("s1"));
        session.cache.generate = Some("stale".to_owned());
        session.begin_utterance("hello there");
        assert_eq!(session.epoch, 1);
        assert!(session.cache.is_empty());
        assert!(session.is_responding);
        assert_eq!(session.phase, Phase::SilenceDetected);
        assert!(session.is_live(1));
        assert!(!session.is_live(0));
    }

    #[test]
    fn duplicate_final_matches_in_flight_utterance_only() {
        let mut session = SessionState::new(SessionId::new("s1"));
        session.begin_utterance("tell me a joke");
        assert!(session.is_duplicate_final(&event("tell me a joke", true)));
        assert!(session.is_duplicate_final(&event("  tell me a joke ", true)));
        assert!(!session.is_duplicate_final(&event("tell me a joke", false)));
        assert!(!session.is_duplicate_final(&event("never mind", true)));
        session.reset_to_listening();
        assert!(!session.is_duplicate_final(&event("tell me a joke", true)));
    }

    #[test]
    fn reset_invalidates_live_epoch() {
        let mut session = SessionState::new(SessionId::new("s1"));
        session.begin_utterance("one");
        let epoch = session.epoch;
        session.reset_to_listening();
        assert!(!session.is_live(epoch));
        assert!(!session.is_responding);
        assert_eq!(session.phase, Phase::Listening);
    }

    #[test]
    fn stage_timers_allow_one_live_slot() {
        let mut timers = StageTimers::default();
        timers.set(Stage::Generate, CancellationToken::new());
        assert_eq!(timers.live_count(), 1);
        assert!(timers.take(Stage::Generate).is_some());
        assert_eq!(timers.live_count(), 0);
        timers.set(Stage::Synthesize, CancellationToken::new());
        assert_eq!(timers.cancel_all(), 1);
        assert_eq!(timers.live_count(), 0);
    }

    #[test]
    #[should_panic(expected = "already live")]
    fn double_scheduling_a_stage_panics() {
        let mut timers = StageTimers::default();
        timers.set(Stage::Generate, CancellationToken::new());
        timers.set(Stage::Generate, CancellationToken::new());
    }
}
