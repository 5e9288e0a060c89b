//! Speech collaborator traits

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::events::TranscriptEvent;
use crate::Result;

/// Endpointing configuration for one streaming transcription session
#[derive(Debug, Clone)]
pub struct SttSessionConfig {
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Silence (ms) after which the service marks speech final
    pub endpointing_ms: u32,
    /// Longer silence (ms) after which the service emits a turn boundary
    pub utterance_end_ms: u32,
}

impl Default for SttSessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            endpointing_ms: 300,
            utterance_end_ms: 1200,
        }
    }
}

/// Streaming speech-to-text collaborator.
///
/// `open` establishes one transcription session per call; results are
/// delivered on the provided channel so transcription I/O stays decoupled
/// from the engine's consumers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn open(
        &self,
        config: SttSessionConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<Box<dyn SttStream>>;
}

/// Handle to an open transcription session
#[async_trait]
pub trait SttStream: Send + Sync {
    /// Forward a chunk of inbound call audio
    async fn push_audio(&self, audio: &[u8]) -> Result<()>;

    /// Gracefully shut the session down
    async fn close(&self);
}

/// Streaming text-to-speech collaborator.
///
/// Returns raw synthesis bytes as they arrive; the engine repacks them
/// into fixed-size playback frames.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize_stream(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
}
