//! Wire types for the recognizer helper protocol.
//!
//! The helper speaks newline-delimited JSON:
//! - **Commands**: sent to the helper's stdin (one JSON object per line)
//! - **Events**: received from the helper's stdout (streaming JSON lines)
//!
//! Both directions use `{ "type": ..., "data": ... }` envelopes; event
//! payload fields are camelCase.

use crate::engine::messages::TranscriptionEvent;
use crate::error::{Result, TurnError};
use serde::{Deserialize, Serialize};

/// A command sent to the helper's stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecognizerCommand {
    /// Begin continuous recognition.
    StartListening,
    /// Stop recognition entirely.
    StopListening,
    /// Restart recognition after a finalized utterance so listening never
    /// stops for the life of the session.
    ResetRecognition,
}

/// An event received from the helper's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecognizerEvent {
    /// A transcription update, partial or final.
    TranscriptionUpdate(TranscriptionUpdate),
    /// Any event type this engine does not consume.
    #[serde(other)]
    Unknown,
}

/// Payload of a `transcription_update` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionUpdate {
    /// Transcribed text so far.
    #[serde(default)]
    pub text: String,
    /// Whether the recognizer finalized this utterance.
    #[serde(default)]
    pub is_final: bool,
    /// Whether local synthesis output was audible during this update.
    #[serde(default)]
    pub is_speaking: bool,
    /// Start of the transcribed audio window, seconds from session start.
    #[serde(default)]
    pub audio_start_time: Option<f64>,
    /// End of the transcribed audio window, seconds from session start.
    #[serde(default)]
    pub audio_end_time: Option<f64>,
}

impl From<TranscriptionUpdate> for TranscriptionEvent {
    fn from(update: TranscriptionUpdate) -> Self {
        TranscriptionEvent::new(update.text, update.is_final, update.is_speaking)
    }
}

/// Parse one stdout line into a recognizer event.
///
/// # Errors
///
/// Returns an error for unparseable lines; the caller drops them with a
/// logged warning without altering session state.
pub fn parse_event_line(line: &str) -> Result<RecognizerEvent> {
    serde_json::from_str(line).map_err(|e| TurnError::Recognizer(format!("malformed event: {e}")))
}

/// Encode a command as one stdin line (newline included).
///
/// # Errors
///
/// Returns an error if the command cannot be serialized.
pub fn encode_command_line(command: &RecognizerCommand) -> Result<String> {
    let mut line = serde_json::to_string(command)
        .map_err(|e| TurnError::Recognizer(format!("failed to encode command: {e}")))?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transcription_update_with_camel_case_fields() {
        let line = r#"{"type":"transcription_update","data":{"text":"hello there","isFinal":true,"isSpeaking":false,"audioStartTime":0.4,"audioEndTime":1.9}}"#;
        let event = parse_event_line(line).expect("parse");
        let RecognizerEvent::TranscriptionUpdate(update) = event else {
            panic!("expected transcription update");
        };
        assert_eq!(update.text, "hello there");
        assert!(update.is_final);
        assert!(!update.is_speaking);
        assert_eq!(update.audio_end_time, Some(1.9));
    }

    #[test]
    fn missing_payload_fields_default() {
        let line = r#"{"type":"transcription_update","data":{"text":"hi"}}"#;
        let event = parse_event_line(line).expect("parse");
        let RecognizerEvent::TranscriptionUpdate(update) = event else {
            panic!("expected transcription update");
        };
        assert!(!update.is_final);
        assert!(update.audio_start_time.is_none());
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let line = r#"{"type":"recognition_status","data":{"state":"warming"}}"#;
        assert!(matches!(
            parse_event_line(line).expect("parse"),
            RecognizerEvent::Unknown
        ));
    }

    #[test]
    fn malformed_lines_error() {
        assert!(parse_event_line("not json").is_err());
        assert!(parse_event_line(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn commands_encode_as_tagged_lines() {
        let line = encode_command_line(&RecognizerCommand::ResetRecognition).expect("encode");
        assert_eq!(line, "{\"type\":\"reset_recognition\"}\n");
        let line = encode_command_line(&RecognizerCommand::StartListening).expect("encode");
        assert!(line.ends_with('\n'));
        assert!(line.contains("start_listening"));
    }

    #[test]
    fn update_converts_to_engine_event() {
        let update = TranscriptionUpdate {
            text: "stop".to_owned(),
            is_final: false,
            is_speaking: true,
            audio_start_time: None,
            audio_end_time: None,
        };
        let event: TranscriptionEvent = update.into();
        assert_eq!(event.text, "stop");
        assert!(event.is_speaking);
        assert!(!event.is_final);
    }
}
