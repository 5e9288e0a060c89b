//! Collaborator traits
//!
//! The call engine talks to every external service through these seams.
//! Implementations are constructed once at startup and injected; nothing
//! reaches for ambient global clients.

pub mod generation;
pub mod speech;
pub mod telephony;

pub use generation::ResponseGenerator;
pub use speech::{SpeechSynthesizer, SttSessionConfig, SttStream, Transcriber};
pub use telephony::{CallControl, MediaSink, TranscriptSink};
