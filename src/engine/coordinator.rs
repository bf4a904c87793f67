//! Engine facade and per-session actor loop.
//!
//! [`TurnEngine`] owns the collaborators and hands out one
//! [`SessionHandle`] per voice channel. Each handle fronts an actor task
//! that serializes every mutation of that session's state: transcription
//! events, timer firings, and collaborator completions all arrive through
//! one mailbox and are applied in order. Concurrency exists across
//! sessions, never within one.

use crate::collab::{
    AudioSink, ConversationTurn, ResponseGenerator, SpeechSynthesizer, TurnContext, with_timeout,
};
use crate::config::EngineConfig;
use crate::engine::cascade::TimerCascadeManager;
use crate::engine::interrupt::{InterruptDecision, InterruptionController};
use crate::engine::messages::{EngineEvent, SessionMsg, Stage, TranscriptionEvent};
use crate::engine::session::{Phase, SessionId, SessionState};
use crate::error::{Result, TurnError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Engine event fan-out buffer.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Owns the collaborators and the session registry.
pub struct TurnEngine {
    config: EngineConfig,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Arc<dyn AudioSink>,
    event_tx: broadcast::Sender<EngineEvent>,
    sessions: Arc<Mutex<HashMap<SessionId, mpsc::UnboundedSender<SessionMsg>>>>,
}

impl TurnEngine {
    /// Create an engine with the given configuration and collaborators.
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        playback: Arc<dyn AudioSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            config,
            generator,
            synthesizer,
            playback,
            event_tx,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to the engine event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Open a session for a newly connected voice channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a session with this id is already open;
    /// sessions are never reused across channels.
    pub fn open_session(&self, id: SessionId) -> Result<SessionHandle> {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| TurnError::Session("session registry poisoned".to_owned()))?;
            if let Some(existing) = sessions.get(&id) {
                if !existing.is_closed() {
                    return Err(TurnError::Session(format!("session '{id}' already open")));
                }
            }
            sessions.insert(id.clone(), msg_tx.clone());
        }

        let actor = SessionActor {
            state: SessionState::new(id.clone()),
            cascade: TimerCascadeManager::new(self.config.cascade.clone(), msg_tx.clone()),
            generator: Arc::clone(&self.generator),
            synthesizer: Arc::clone(&self.synthesizer),
            playback: Arc::clone(&self.playback),
            call_timeout: self.config.collaborator.call_timeout(),
            event_tx: self.event_tx.clone(),
            msg_tx: msg_tx.clone(),
        };
        let sessions = Arc::clone(&self.sessions);
        let actor_id = id.clone();
        tokio::spawn(async move {
            actor.run(msg_rx).await;
            if let Ok(mut sessions) = sessions.lock() {
                sessions.remove(&actor_id);
            }
        });

        Ok(SessionHandle { id, msg_tx })
    }

    /// Close every open session.
    pub fn close_all(&self) {
        let senders: Vec<_> = match self.sessions.lock() {
            Ok(sessions) => sessions.values().cloned().collect(),
            Err(_) => return,
        };
        for tx in senders {
            let _ = tx.send(SessionMsg::Close);
        }
    }

    /// Number of currently open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Message-passing front for one session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    msg_tx: mpsc::UnboundedSender<SessionMsg>,
}

impl SessionHandle {
    /// The session's channel id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Deliver one transcription event.
    ///
    /// # Errors
    ///
    /// Returns an error if the session has been closed.
    pub fn transcription(&self, event: TranscriptionEvent) -> Result<()> {
        self.msg_tx
            .send(SessionMsg::Transcription(event))
            .map_err(|_| TurnError::Channel(format!("session '{}' is closed", self.id)))
    }

    /// Signal that the recognizer event stream terminated unexpectedly.
    pub fn recognizer_closed(&self) {
        let _ = self.msg_tx.send(SessionMsg::RecognizerClosed);
    }

    /// Close the session, force-cancelling all timers and stopping playback.
    pub fn close(&self) {
        let _ = self.msg_tx.send(SessionMsg::Close);
    }

    /// Forward a recognizer event stream into the session until it ends.
    ///
    /// Stream termination (the sender side dropping) is reported as
    /// recognizer loss, transitioning the session to `Idle`.
    pub fn attach_event_stream(
        &self,
        mut rx: mpsc::Receiver<TranscriptionEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if handle.transcription(event).is_err() {
                    return;
                }
            }
            handle.recognizer_closed();
        })
    }
}

/// The owning task for one session. Sole writer of the session's phase.
struct SessionActor {
    state: SessionState,
    cascade: TimerCascadeManager,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Arc<dyn AudioSink>,
    call_timeout: std::time::Duration,
    event_tx: broadcast::Sender<EngineEvent>,
    msg_tx: mpsc::UnboundedSender<SessionMsg>,
}

impl SessionActor {
    async fn run(mut self, mut msg_rx: mpsc::UnboundedReceiver<SessionMsg>) {
        info!(session = %self.state.id, "session opened");
        self.emit(EngineEvent::SessionOpened {
            session: self.state.id.clone(),
        });

        while let Some(msg) = msg_rx.recv().await {
            match msg {
                SessionMsg::Transcription(event) => self.on_transcription(event).await,
                SessionMsg::StageElapsed { stage, epoch } => self.on_stage_elapsed(stage, epoch),
                SessionMsg::GenerateDone { epoch, result } => {
                    self.on_generate_done(epoch, result);
                }
                SessionMsg::SynthesizeDone { epoch, result } => {
                    self.on_synthesize_done(epoch, result);
                }
                SessionMsg::PlaybackDone { epoch, result } => {
                    self.on_playback_done(epoch, result);
                }
                SessionMsg::RecognizerClosed => self.on_recognizer_closed().await,
                SessionMsg::Close => {
                    self.teardown().await;
                    break;
                }
            }
        }

        info!(session = %self.state.id, "session closed");
        self.emit(EngineEvent::SessionClosed {
            session: self.state.id.clone(),
        });
    }

    async fn on_transcription(&mut self, event: TranscriptionEvent) {
        if self.state.phase == Phase::Idle {
            debug!(session = %self.state.id, "dropping event for idle session");
            return;
        }

        // Transport-level duplicate of the final that started the in-flight
        // cascade. Checked before the barge-in guard so redelivery stays
        // idempotent.
        if self.state.is_duplicate_final(&event) {
            debug!(session = %self.state.id, "duplicate final dropped");
            return;
        }

        if InterruptionController::classify(&self.state, &event) == InterruptDecision::BargeIn {
            let was_playing =
                InterruptionController::interrupt(&mut self.state, self.playback.as_ref()).await;
            self.emit(EngineEvent::Interrupted {
                session: self.state.id.clone(),
                was_playing,
            });
        }

        if event.is_final && !self.state.is_responding {
            let text = event.text.trim();
            if text.is_empty() {
                debug!(session = %self.state.id, "empty final ignored");
                return;
            }
            self.begin_cascade(text);
        }
    }

    fn begin_cascade(&mut self, utterance: &str) {
        self.state.begin_utterance(utterance);
        info!(
            session = %self.state.id,
            epoch = self.state.epoch,
            utterance,
            "utterance finalized, cascade scheduled"
        );
        self.emit(EngineEvent::UtteranceFinalized {
            session: self.state.id.clone(),
            text: utterance.to_owned(),
        });
        self.cascade.schedule_generate(&mut self.state);
    }

    fn on_stage_elapsed(&mut self, stage: Stage, epoch: u64) {
        // Liveness re-check: a timer already dispatched at the moment of a
        // barge-in still delivers its message; it must do nothing here.
        if !self.state.is_live(epoch) {
            debug!(session = %self.state.id, %stage, epoch, "stale stage timer ignored");
            return;
        }
        self.state.timers.take(stage);

        match stage {
            Stage::Generate => self.dispatch_generate(epoch),
            Stage::Synthesize => self.dispatch_synthesize(epoch),
            Stage::Play => self.dispatch_play(epoch),
        }
    }

    fn dispatch_generate(&mut self, epoch: u64) {
        self.state.phase = Phase::Responding;
        self.emit(EngineEvent::ResponseStarted {
            session: self.state.id.clone(),
        });

        let ctx = TurnContext {
            utterance: self.state.utterance.clone(),
            history: self.state.history.clone(),
        };
        let generator = Arc::clone(&self.generator);
        let timeout = self.call_timeout;
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = with_timeout("generate", timeout, generator.generate(&ctx)).await;
            let _ = tx.send(SessionMsg::GenerateDone { epoch, result });
        });
    }

    fn dispatch_synthesize(&mut self, epoch: u64) {
        let Some(text) = self.state.cache.generate.clone() else {
            warn!(session = %self.state.id, "synthesize stage fired with no generated text");
            self.fail_cascade(Stage::Synthesize, "no generated text cached".to_owned());
            return;
        };
        let synthesizer = Arc::clone(&self.synthesizer);
        let timeout = self.call_timeout;
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = with_timeout("synthesize", timeout, synthesizer.synthesize(&text)).await;
            let _ = tx.send(SessionMsg::SynthesizeDone { epoch, result });
        });
    }

    fn dispatch_play(&mut self, epoch: u64) {
        let Some(audio) = self.state.cache.synthesize.clone() else {
            warn!(session = %self.state.id, "play stage fired with no synthesized audio");
            self.fail_cascade(Stage::Play, "no synthesized audio cached".to_owned());
            return;
        };
        self.state.is_playing = true;
        self.emit(EngineEvent::PlaybackStarted {
            session: self.state.id.clone(),
        });

        let playback = Arc::clone(&self.playback);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = playback.start(audio).await;
            let _ = tx.send(SessionMsg::PlaybackDone { epoch, result });
        });
    }

    fn on_generate_done(&mut self, epoch: u64, result: Result<String>) {
        if !self.state.is_live(epoch) {
            debug!(session = %self.state.id, epoch, "stale generator result discarded");
            return;
        }
        match result {
            Ok(text) => {
                debug!(session = %self.state.id, chars = text.len(), "response generated");
                self.state.cache.generate = Some(text);
                self.cascade.schedule_synthesize(&mut self.state);
            }
            Err(e) => self.fail_cascade(Stage::Generate, e.to_string()),
        }
    }

    fn on_synthesize_done(&mut self, epoch: u64, result: Result<crate::collab::AudioHandle>) {
        if !self.state.is_live(epoch) {
            debug!(session = %self.state.id, epoch, "stale synthesizer result discarded");
            return;
        }
        match result {
            Ok(audio) => {
                self.state.cache.synthesize = Some(audio);
                self.cascade.schedule_play(&mut self.state);
            }
            Err(e) => self.fail_cascade(Stage::Synthesize, e.to_string()),
        }
    }

    fn on_playback_done(&mut self, epoch: u64, result: Result<crate::collab::PlaybackOutcome>) {
        if !self.state.is_live(epoch) {
            // Normal after a barge-in: the stopped playback call resolves
            // once the teardown has already reset the session.
            debug!(session = %self.state.id, epoch, "stale playback result discarded");
            return;
        }
        match result {
            Ok(crate::collab::PlaybackOutcome::Completed) => {
                let assistant_text = self.state.cache.generate.clone().unwrap_or_default();
                self.state.history.push(ConversationTurn {
                    user_text: self.state.utterance.clone(),
                    assistant_text,
                });
                self.state.reset_to_listening();
                info!(session = %self.state.id, "playback finished, listening");
                self.emit(EngineEvent::PlaybackFinished {
                    session: self.state.id.clone(),
                });
            }
            Ok(crate::collab::PlaybackOutcome::Stopped) => {
                // Only the barge-in path issues stop, and it invalidates the
                // epoch first, so a current-epoch Stopped means the sink quit
                // on its own.
                warn!(session = %self.state.id, "playback stopped outside a barge-in");
                self.state.reset_to_listening();
            }
            Err(e) => self.fail_cascade(Stage::Play, e.to_string()),
        }
    }

    /// Abort the cascade for this utterance. The session returns to
    /// `Listening`; a fresh utterance naturally re-triggers the cascade.
    fn fail_cascade(&mut self, stage: Stage, error: String) {
        warn!(session = %self.state.id, %stage, %error, "cascade aborted");
        self.state.reset_to_listening();
        self.emit(EngineEvent::CascadeFailed {
            session: self.state.id.clone(),
            stage,
            error,
        });
    }

    async fn on_recognizer_closed(&mut self) {
        warn!(session = %self.state.id, "recognizer stream terminated, session idle");
        self.teardown().await;
        self.emit(EngineEvent::RecognizerLost {
            session: self.state.id.clone(),
        });
    }

    /// Force-cancel all in-flight work and go idle.
    async fn teardown(&mut self) {
        self.cascade.cancel_all(&mut self.state);
        let was_playing = self.state.is_playing;
        if was_playing {
            if let Err(e) = self.playback.stop().await {
                warn!(session = %self.state.id, "playback stop failed during teardown: {e}");
            }
        }
        self.state.reset_to_listening();
        self.state.phase = Phase::Idle;
    }

    fn emit(&self, event: EngineEvent) {
        // Subscribers are optional; a lagging or absent receiver never
        // affects the session.
        let _ = self.event_tx.send(event);
    }
}
