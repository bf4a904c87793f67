//! Manual end-to-end harness: engine + echo collaborators + a scripted or
//! real recognizer helper.
//!
//! With `SYLPH_RECOGNIZER` set, events come from the configured helper
//! process; otherwise a short scripted conversation is replayed. Engine
//! events are printed as they happen.
//!
//! ```text
//! RUST_LOG=sylph=debug cargo run --bin sylph-harness
//! SYLPH_RECOGNIZER=/path/to/helper cargo run --bin sylph-harness
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sylph::{
    AudioHandle, AudioSink, EngineConfig, PlaybackOutcome, RecognizerSupervisor,
    ResponseGenerator, SessionId, SpeechSynthesizer, TranscriptionEvent, TurnContext, TurnEngine,
};
use tokio::sync::Notify;

struct EchoGenerator;

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(&self, ctx: &TurnContext) -> sylph::Result<String> {
        Ok(format!("You said: {}", ctx.utterance))
    }
}

struct StubSynthesizer;

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str) -> sylph::Result<AudioHandle> {
        Ok(AudioHandle {
            reference: format!("stub-audio:{}", text.len()),
        })
    }
}

/// Pretend playback: each response "plays" for two seconds unless stopped.
struct TimedSink {
    stop: Notify,
}

#[async_trait]
impl AudioSink for TimedSink {
    async fn start(&self, audio: AudioHandle) -> sylph::Result<PlaybackOutcome> {
        println!("▶ playing {}", audio.reference);
        tokio::select! {
            () = self.stop.notified() => Ok(PlaybackOutcome::Stopped),
            () = tokio::time::sleep(Duration::from_secs(2)) => Ok(PlaybackOutcome::Completed),
        }
    }

    async fn stop(&self) -> sylph::Result<()> {
        self.stop.notify_waiters();
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("sylph-harness failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    // Keep the harness snappy.
    config.cascade.generate_delay_ms = 400;
    config.cascade.synthesize_delay_ms = 300;
    config.cascade.play_delay_ms = 200;
    config.cascade.adaptive.enabled = false;

    let engine = TurnEngine::new(
        config.clone(),
        Arc::new(EchoGenerator),
        Arc::new(StubSynthesizer),
        Arc::new(TimedSink { stop: Notify::new() }),
    );
    let mut events = engine.subscribe();
    let session = engine.open_session(SessionId::new("harness"))?;

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {event:?}");
        }
    });

    if let Ok(command) = std::env::var("SYLPH_RECOGNIZER") {
        config.recognizer.command = command;
        let (supervisor, event_rx) = RecognizerSupervisor::new(config.recognizer);
        let cancel = supervisor.cancel_token();
        let supervisor_task = tokio::spawn(supervisor.run());
        let pump = session.attach_event_stream(event_rx);

        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        let _ = supervisor_task.await;
        let _ = pump.await;
    } else {
        replay_scripted_conversation(&session).await?;
    }

    session.close();
    drop(engine);
    let _ = printer.await;
    Ok(())
}

/// A canned exchange: one full turn, then a barge-in mid-playback.
async fn replay_scripted_conversation(session: &sylph::SessionHandle) -> anyhow::Result<()> {
    session.transcription(TranscriptionEvent::new("tell me about", false, false))?;
    session.transcription(TranscriptionEvent::new(
        "tell me about quantum computing",
        true,
        false,
    ))?;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Barge in while the response is playing.
    session.transcription(TranscriptionEvent::new("actually never mind", false, false))?;
    session.transcription(TranscriptionEvent::new("actually never mind", true, false))?;
    tokio::time::sleep(Duration::from_secs(4)).await;
    Ok(())
}
