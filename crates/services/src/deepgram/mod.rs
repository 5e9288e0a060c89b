//! Deepgram speech services

pub mod stt;
pub mod tts;

pub use stt::DeepgramTranscriber;
pub use tts::DeepgramSpeech;
