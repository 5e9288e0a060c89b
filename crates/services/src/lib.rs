//! Collaborator drivers for the callprobe engine
//!
//! Each driver implements one of the `callprobe-core` collaborator traits:
//! - Deepgram streaming STT over WebSocket
//! - Deepgram streaming TTS over HTTP
//! - OpenAI chat completions for patient replies
//! - Twilio REST call control (dialing, status, hangup)
//! - File-based transcript persistence

pub mod deepgram;
pub mod openai;
pub mod transcript;
pub mod twilio;

pub use deepgram::{DeepgramSpeech, DeepgramTranscriber};
pub use openai::OpenAiResponder;
pub use transcript::FileTranscriptSink;
pub use twilio::TwilioCallControl;
