//! Timer cascade scheduling.
//!
//! The cascade lets the engine start costly work speculatively early while a
//! natural pause in speech can still cancel it: generate fires first on a
//! short delay, synthesize and play each fire on their own delay after the
//! previous stage's work completes. Stages are chained: at most one timer
//! counts down per session at any instant.
//!
//! Cancelling a timer token is necessary but not sufficient: a timer already
//! dispatched into the scheduler can still deliver its message. The actor
//! re-checks liveness (utterance epoch + `is_responding`) when the message
//! arrives; the token only keeps the sleep from lingering.

use crate::config::CascadeConfig;
use crate::engine::messages::{SessionMsg, Stage};
use crate::engine::session::SessionState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Schedules and cancels the three-stage delayed pipeline for one session.
pub(crate) struct TimerCascadeManager {
    config: CascadeConfig,
    msg_tx: mpsc::UnboundedSender<SessionMsg>,
}

impl TimerCascadeManager {
    pub(crate) fn new(config: CascadeConfig, msg_tx: mpsc::UnboundedSender<SessionMsg>) -> Self {
        Self { config, msg_tx }
    }

    /// Schedule the generate stage for the session's current utterance.
    ///
    /// # Panics
    ///
    /// Panics if any stage timer is already live: two concurrent cascades
    /// for one session is a programming bug, not a runtime condition.
    pub(crate) fn schedule_generate(&self, session: &mut SessionState) {
        assert_eq!(
            session.timers.live_count(),
            0,
            "second cascade scheduled for session {}",
            session.id
        );
        debug_assert!(
            session.cache.is_empty(),
            "stale artifacts at cascade start"
        );
        let delay = self.config.generate_delay_for(&session.utterance);
        self.schedule(session, Stage::Generate, delay);
    }

    /// Schedule the synthesize stage after generation completed.
    pub(crate) fn schedule_synthesize(&self, session: &mut SessionState) {
        self.schedule(session, Stage::Synthesize, self.config.synthesize_delay());
    }

    /// Schedule the play stage after synthesis completed.
    pub(crate) fn schedule_play(&self, session: &mut SessionState) {
        self.schedule(session, Stage::Play, self.config.play_delay());
    }

    /// Cancel every live stage timer for the session.
    pub(crate) fn cancel_all(&self, session: &mut SessionState) -> usize {
        let cancelled = session.timers.cancel_all();
        if cancelled > 0 {
            debug!(session = %session.id, cancelled, "cancelled stage timers");
        }
        cancelled
    }

    fn schedule(&self, session: &mut SessionState, stage: Stage, delay: Duration) {
        let token = CancellationToken::new();
        session.timers.set(stage, token.clone());
        let epoch = session.epoch;
        let tx = self.msg_tx.clone();
        debug!(session = %session.id, %stage, ?delay, epoch, "stage timer scheduled");
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(SessionMsg::StageElapsed { stage, epoch });
                }
            }
        });
    }
}
