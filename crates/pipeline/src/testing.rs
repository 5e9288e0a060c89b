//! Mock collaborators shared by the engine's test modules

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use callprobe_core::{
    CallControl, CallTranscript, Error, MediaSink, ResponseGenerator, Result, Scenario,
    SpeechSynthesizer, SttSessionConfig, SttStream, Transcriber, TranscriptEvent, TranscriptSink,
    Turn, MULAW_FRAME_BYTES,
};

use crate::session::{SessionContext, SessionTiming};

pub fn test_scenario() -> Scenario {
    Scenario {
        id: "test_scenario".into(),
        name: "Test Scenario".into(),
        description: "persona for engine tests".into(),
        voice: "aura-asteria-en".into(),
        system_prompt: "You are a test patient.".into(),
        opening_line: "Hi, I'm calling about an appointment.".into(),
    }
}

pub fn test_timing() -> SessionTiming {
    SessionTiming::default()
}

pub fn test_context() -> Arc<SessionContext> {
    SessionContext::new(Arc::new(test_scenario()), "MZ-test".into(), Some("CA-test".into()))
}

/// Media sink recording every frame with its send time
#[derive(Default)]
pub struct RecordingMedia {
    sent: Mutex<Vec<(Instant, Vec<u8>)>>,
    clears: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingMedia {
    pub fn sent(&self) -> Vec<(Instant, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaSink for RecordingMedia {
    async fn send_audio(&self, frame: &[u8]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transport("send failed".into()));
        }
        self.sent.lock().push((Instant::now(), frame.to_vec()));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Responder returning one fixed reply
pub struct StaticResponder {
    reply: String,
}

impl StaticResponder {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for StaticResponder {
    async fn generate_reply(&self, _history: &[Turn], _persona: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Responder that always fails
pub struct FailingResponder;

#[async_trait]
impl ResponseGenerator for FailingResponder {
    async fn generate_reply(&self, _history: &[Turn], _persona: &str) -> Result<String> {
        Err(Error::Generation("model unavailable".into()))
    }
}

/// Synthesizer streaming scripted chunk sizes, optionally slowly
pub struct ChunkSynthesizer {
    chunk_sizes: Vec<usize>,
    chunk_delay: Duration,
}

impl ChunkSynthesizer {
    /// Chunks of the given byte sizes, delivered immediately
    pub fn bytes(chunk_sizes: Vec<usize>) -> Self {
        Self {
            chunk_sizes,
            chunk_delay: Duration::ZERO,
        }
    }

    /// `n` frame-sized chunks, delivered immediately
    pub fn frames(n: usize) -> Self {
        Self::bytes(vec![MULAW_FRAME_BYTES; n])
    }

    /// `n` frame-sized chunks with a delay before each one
    pub fn slow(n: usize, chunk_delay: Duration) -> Self {
        Self {
            chunk_sizes: vec![MULAW_FRAME_BYTES; n],
            chunk_delay,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ChunkSynthesizer {
    async fn synthesize_stream(
        &self,
        _text: &str,
        _voice: &str,
    ) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let delay = self.chunk_delay;
        let stream = futures::stream::iter(self.chunk_sizes.clone())
            .then(move |size| async move {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                Ok(vec![0x42u8; size])
            })
            .boxed();
        Ok(stream)
    }
}

/// Call control recording every terminate request
#[derive(Default)]
pub struct RecordingCallControl {
    terminated: Mutex<Vec<String>>,
}

impl RecordingCallControl {
    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().clone()
    }
}

#[async_trait]
impl CallControl for RecordingCallControl {
    async fn terminate(&self, call_sid: &str) -> Result<()> {
        self.terminated.lock().push(call_sid.to_string());
        Ok(())
    }
}

/// Transcript sink keeping everything in memory
#[derive(Default)]
pub struct MemoryTranscripts {
    saved: Mutex<Vec<CallTranscript>>,
}

impl MemoryTranscripts {
    pub fn saved(&self) -> Vec<CallTranscript> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl TranscriptSink for MemoryTranscripts {
    async fn persist(&self, transcript: &CallTranscript) -> Result<()> {
        self.saved.lock().push(transcript.clone());
        Ok(())
    }
}

/// Transcriber handing the test its event sender and recording audio
#[derive(Default)]
pub struct ScriptedTranscriber {
    events: Mutex<Option<mpsc::Sender<TranscriptEvent>>>,
    audio_bytes: Arc<AtomicUsize>,
    fail_open: AtomicBool,
}

impl ScriptedTranscriber {
    pub fn failing() -> Self {
        let transcriber = Self::default();
        transcriber.fail_open.store(true, Ordering::SeqCst);
        transcriber
    }

    /// Sender captured from the engine's `open` call
    pub fn events(&self) -> mpsc::Sender<TranscriptEvent> {
        self.events.lock().clone().expect("transcriber not opened")
    }

    pub fn audio_bytes(&self) -> usize {
        self.audio_bytes.load(Ordering::SeqCst)
    }
}

struct ScriptedSttStream {
    audio_bytes: Arc<AtomicUsize>,
}

#[async_trait]
impl SttStream for ScriptedSttStream {
    async fn push_audio(&self, audio: &[u8]) -> Result<()> {
        self.audio_bytes.fetch_add(audio.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {}
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn open(
        &self,
        _config: SttSessionConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<Box<dyn SttStream>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Transcription("connection refused".into()));
        }
        *self.events.lock() = Some(events);
        Ok(Box::new(ScriptedSttStream {
            audio_bytes: Arc::clone(&self.audio_bytes),
        }))
    }
}
