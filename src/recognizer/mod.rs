//! Recognizer helper adapter: wire protocol and process supervision.

pub mod protocol;
pub mod supervisor;

pub use protocol::{RecognizerCommand, RecognizerEvent, TranscriptionUpdate};
pub use supervisor::RecognizerSupervisor;
