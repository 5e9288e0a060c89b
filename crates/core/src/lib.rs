//! Core types and traits for the callprobe voice bot
//!
//! This crate provides the foundation shared by all other crates:
//! - Collaborator traits for the external services a call depends on
//!   (transcription, reply generation, synthesis, call control, persistence)
//! - Audio frame types and μ-law frame repacking
//! - Conversation turns and call transcripts
//! - Transport and transcription event types
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod events;
pub mod persona;
pub mod traits;

pub use audio::{silence_frame, FrameChunker, PlaybackFrame, MULAW_FRAME_BYTES, MULAW_SILENCE};
pub use conversation::{CallTranscript, Speaker, Turn};
pub use error::{Error, Result};
pub use events::{EndReason, InboundEvent, TranscriptEvent};
pub use persona::Scenario;

pub use traits::{
    // Speech
    SpeechSynthesizer, SttSessionConfig, SttStream, Transcriber,
    // Generation
    ResponseGenerator,
    // Telephony
    CallControl, MediaSink, TranscriptSink,
};

/// In-band token a generated reply uses to signal the bot should hang up
/// after speaking. Stripped before synthesis and before the transcript.
pub const END_CALL_MARKER: &str = "[END_CALL]";
