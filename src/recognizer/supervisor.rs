//! Recognizer helper process supervision.
//!
//! Spawns the helper, forwards its transcription events as typed engine
//! events, and keeps recognition continuous: `reset_recognition` is sent
//! after every finalized utterance, and the helper is respawned on exit
//! with exponential backoff. The engine core only ever sees a well-typed
//! event stream; stream termination (supervisor give-up or cancellation)
//! is visible to it as the channel closing.

use crate::config::RecognizerConfig;
use crate::engine::messages::TranscriptionEvent;
use crate::error::{Result, TurnError};
use crate::recognizer::protocol::{
    RecognizerCommand, RecognizerEvent, encode_command_line, parse_event_line,
};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffered transcription events between supervisor and session.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Maximum number of bytes accepted per helper stdout line (64 KB).
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Consecutive spawn failures before the supervisor gives up.
const MAX_SPAWN_FAILURES: u32 = 5;

/// Why one helper incarnation ended.
enum ChildExit {
    /// The supervisor was cancelled.
    Cancelled,
    /// The session side dropped the event receiver.
    ReceiverGone,
    /// The helper exited or its stdout closed.
    Exited,
}

/// Supervises one recognizer helper process per session.
pub struct RecognizerSupervisor {
    config: RecognizerConfig,
    event_tx: mpsc::Sender<TranscriptionEvent>,
    cancel: CancellationToken,
}

impl RecognizerSupervisor {
    /// Create a supervisor and the event stream it will feed.
    pub fn new(config: RecognizerConfig) -> (Self, mpsc::Receiver<TranscriptionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        (
            Self {
                config,
                event_tx,
                cancel: CancellationToken::new(),
            },
            event_rx,
        )
    }

    /// Token that stops the supervisor and kills the helper.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled, the session drops the stream, or repeated
    /// spawn failures force a give-up.
    ///
    /// # Errors
    ///
    /// Returns an error after [`MAX_SPAWN_FAILURES`] consecutive failed
    /// spawns, surfaced as a channel-level failure for the caller to handle.
    pub async fn run(self) -> Result<()> {
        let mut backoff = self.config.restart_delay();
        let mut spawn_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.run_child().await {
                Ok(ChildExit::Cancelled) => return Ok(()),
                Ok(ChildExit::ReceiverGone) => {
                    debug!("session dropped the event stream, supervisor exiting");
                    return Ok(());
                }
                Ok(ChildExit::Exited) => {
                    spawn_failures = 0;
                    warn!(
                        command = %self.config.command,
                        "recognizer helper exited, respawning in {backoff:?}"
                    );
                }
                Err(e) => {
                    spawn_failures += 1;
                    if spawn_failures >= MAX_SPAWN_FAILURES {
                        return Err(TurnError::Recognizer(format!(
                            "giving up after {spawn_failures} failed spawns: {e}"
                        )));
                    }
                    warn!(
                        command = %self.config.command,
                        "recognizer spawn failed ({e}), retrying in {backoff:?}"
                    );
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.max_restart_delay());
        }
    }

    /// Run one helper incarnation to completion.
    async fn run_child(&self) -> Result<ChildExit> {
        let mut child = self.spawn_child()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TurnError::Recognizer("helper stdin unavailable".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TurnError::Recognizer("helper stdout unavailable".to_owned()))?;
        let mut lines = BufReader::new(stdout).lines();

        if let Err(e) = send_command(&mut stdin, &RecognizerCommand::StartListening).await {
            // The helper can exit before consuming its stdin; that is an
            // ordinary exit, not a spawn failure.
            warn!("helper rejected start_listening: {e}");
            let _ = child.wait().await;
            return Ok(ChildExit::Exited);
        }
        info!(command = %self.config.command, pid = child.id(), "recognizer helper started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = send_command(&mut stdin, &RecognizerCommand::StopListening).await;
                    let _ = child.start_kill();
                    return Ok(ChildExit::Cancelled);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(exit) = self.handle_line(&line, &mut stdin).await {
                                let _ = child.start_kill();
                                return Ok(exit);
                            }
                        }
                        Ok(None) => {
                            let _ = child.wait().await;
                            return Ok(ChildExit::Exited);
                        }
                        Err(e) => {
                            warn!("recognizer stdout read failed: {e}");
                            let _ = child.start_kill();
                            return Ok(ChildExit::Exited);
                        }
                    }
                }
            }
        }
    }

    /// Process one stdout line. Returns `Some` when the incarnation must end.
    async fn handle_line(&self, line: &str, stdin: &mut ChildStdin) -> Option<ChildExit> {
        if line.len() > MAX_LINE_BYTES {
            warn!(bytes = line.len(), "oversized recognizer line dropped");
            return None;
        }
        if line.trim().is_empty() {
            return None;
        }

        match parse_event_line(line) {
            Ok(RecognizerEvent::TranscriptionUpdate(update)) => {
                let is_final = update.is_final;
                if self.event_tx.send(update.into()).await.is_err() {
                    return Some(ChildExit::ReceiverGone);
                }
                if is_final {
                    // Restart recognition after every utterance boundary so
                    // the stream never terminates mid-session.
                    if let Err(e) = send_command(stdin, &RecognizerCommand::ResetRecognition).await
                    {
                        warn!("failed to reset recognition: {e}");
                        return Some(ChildExit::Exited);
                    }
                }
                None
            }
            Ok(RecognizerEvent::Unknown) => {
                debug!("ignoring unrecognized helper event");
                None
            }
            Err(e) => {
                warn!("dropped malformed recognizer event: {e}");
                None
            }
        }
    }

    fn spawn_child(&self) -> Result<Child> {
        if self.config.command.is_empty() {
            return Err(TurnError::Recognizer(
                "recognizer command not configured".to_owned(),
            ));
        }
        tokio::process::Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TurnError::Recognizer(format!("failed to spawn '{}': {e}", self.config.command))
            })
    }
}

async fn send_command(stdin: &mut ChildStdin, command: &RecognizerCommand) -> Result<()> {
    let line = encode_command_line(command)?;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| TurnError::Recognizer(format!("helper stdin write failed: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| TurnError::Recognizer(format!("helper stdin flush failed: {e}")))?;
    Ok(())
}
