//! Recognizer supervisor integration tests against shell-script stand-in
//! helpers: clean event flow, recognition restarts after finals, malformed
//! line handling, respawn-on-exit, and spawn give-up.

use std::time::Duration;
use sylph::config::RecognizerConfig;
use sylph::{RecognizerSupervisor, TranscriptionEvent};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn sh_config(script: &str) -> RecognizerConfig {
    RecognizerConfig {
        command: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        restart_delay_ms: 50,
        max_restart_delay_ms: 200,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<TranscriptionEvent>) -> TranscriptionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("stream open")
}

#[tokio::test]
async fn forwards_events_and_resets_after_finals() {
    // The helper emits a partial and a final, then waits for the engine's
    // reset_recognition before emitting one more event.
    let script = r#"
echo '{"type":"transcription_update","data":{"text":"hello","isFinal":false,"isSpeaking":false}}'
echo '{"type":"transcription_update","data":{"text":"hello world","isFinal":true,"isSpeaking":false}}'
while read line; do
  case "$line" in
    *reset_recognition*)
      echo '{"type":"transcription_update","data":{"text":"again","isFinal":false,"isSpeaking":false}}'
      sleep 5
      exit 0
      ;;
  esac
done
"#;
    let (supervisor, mut rx) = RecognizerSupervisor::new(sh_config(script));
    let cancel = supervisor.cancel_token();
    let task = tokio::spawn(supervisor.run());

    let first = next_event(&mut rx).await;
    assert_eq!(first.text, "hello");
    assert!(!first.is_final);

    let second = next_event(&mut rx).await;
    assert_eq!(second.text, "hello world");
    assert!(second.is_final);

    // Only delivered after the helper saw reset_recognition.
    let third = next_event(&mut rx).await;
    assert_eq!(third.text, "again");

    cancel.cancel();
    let result = timeout(Duration::from_secs(5), task).await.expect("join");
    assert!(result.expect("task").is_ok());
}

#[tokio::test]
async fn malformed_and_unknown_lines_are_dropped() {
    let script = r#"
echo 'this is not json'
echo '{"type":"recognition_status","data":{"state":"ready"}}'
echo '{"type":"transcription_update","data":{"text":"kept","isFinal":false,"isSpeaking":false}}'
sleep 5
"#;
    let (supervisor, mut rx) = RecognizerSupervisor::new(sh_config(script));
    let cancel = supervisor.cancel_token();
    let task = tokio::spawn(supervisor.run());

    let event = next_event(&mut rx).await;
    assert_eq!(event.text, "kept");

    cancel.cancel();
    let _ = timeout(Duration::from_secs(5), task).await.expect("join");
}

#[tokio::test]
async fn helper_exit_triggers_respawn() {
    // Each incarnation emits one event and exits; the supervisor respawns.
    let script = r#"
echo '{"type":"transcription_update","data":{"text":"ping","isFinal":false,"isSpeaking":false}}'
exit 0
"#;
    let (supervisor, mut rx) = RecognizerSupervisor::new(sh_config(script));
    let cancel = supervisor.cancel_token();
    let task = tokio::spawn(supervisor.run());

    assert_eq!(next_event(&mut rx).await.text, "ping");
    assert_eq!(next_event(&mut rx).await.text, "ping");

    cancel.cancel();
    let _ = timeout(Duration::from_secs(5), task).await.expect("join");
}

#[tokio::test]
async fn repeated_spawn_failure_gives_up_and_closes_the_stream() {
    let config = RecognizerConfig {
        command: "/nonexistent/sylph-helper".to_owned(),
        args: Vec::new(),
        restart_delay_ms: 10,
        max_restart_delay_ms: 20,
    };
    let (supervisor, mut rx) = RecognizerSupervisor::new(config);
    let task = tokio::spawn(supervisor.run());

    let result = timeout(Duration::from_secs(5), task)
        .await
        .expect("give up within timeout")
        .expect("task");
    assert!(result.is_err());

    // The event stream closes with the supervisor, which the session layer
    // observes as recognizer loss.
    assert!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("closed stream")
            .is_none()
    );
}

#[tokio::test]
async fn unconfigured_command_errors_immediately() {
    let (supervisor, _rx) = RecognizerSupervisor::new(RecognizerConfig::default());
    let result = timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("finish");
    assert!(result.is_err());
}
