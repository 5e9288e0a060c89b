//! Call session controller
//!
//! Owns one call from transport start to teardown. The transport layer
//! handles the connecting phase (it constructs the session once the start
//! event arrives); [`CallSession::run`] is the active phase, and teardown
//! closes the transcription session, records any residual utterance text,
//! and hands the transcript to the persistence collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use callprobe_core::{
    CallControl, CallTranscript, EndReason, InboundEvent, MediaSink, ResponseGenerator, Scenario,
    SpeechSynthesizer, SttSessionConfig, SttStream, Transcriber, TranscriptSink, Turn,
};

use crate::accumulator::TurnAccumulator;
use crate::keepalive::KeepaliveMonitor;
use crate::playback::{FramePacer, PlaybackQueue};
use crate::response::ResponseWorker;

/// Real-time knobs for one call session
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// Nominal duration of one outbound audio frame
    pub frame_duration: Duration,
    /// Wait after a turn boundary before committing to a reply
    pub settle_delay: Duration,
    /// Let the farewell finish audibly before hanging up
    pub hangup_grace: Duration,
    /// Silence before the keepalive filler fires
    pub silence_threshold: Duration,
    /// Keepalive poll cadence
    pub keepalive_poll: Duration,
    /// Spacing of silence frames while nobody is speaking
    pub idle_frame_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            frame_duration: Duration::from_millis(20),
            settle_delay: Duration::from_millis(200),
            hangup_grace: Duration::from_secs(2),
            silence_threshold: Duration::from_secs(10),
            keepalive_poll: Duration::from_secs(1),
            idle_frame_interval: Duration::from_millis(200),
        }
    }
}

/// The collaborator registry a session depends on. Constructed once at
/// startup and shared by every call.
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub call_control: Arc<dyn CallControl>,
    pub transcripts: Arc<dyn TranscriptSink>,
}

/// State shared by every task of one call session.
///
/// The controller owns the session; sub-tasks receive this handle and
/// mutate only their own sub-state.
pub struct SessionContext {
    pub scenario: Arc<Scenario>,
    pub stream_sid: String,
    pub call_sid: Option<String>,
    pub queue: Arc<PlaybackQueue>,
    started_at: DateTime<Utc>,
    speaking: AtomicBool,
    last_activity: Mutex<Instant>,
    end_reason: Mutex<Option<EndReason>>,
    stop: CancellationToken,
    history: Mutex<Vec<Turn>>,
    transcript: Mutex<Vec<Turn>>,
}

impl SessionContext {
    pub fn new(scenario: Arc<Scenario>, stream_sid: String, call_sid: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            scenario,
            stream_sid,
            call_sid,
            queue: Arc::new(PlaybackQueue::new()),
            started_at: Utc::now(),
            speaking: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            end_reason: Mutex::new(None),
            stop: CancellationToken::new(),
            history: Mutex::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
        })
    }

    /// Reset the activity clock (inbound speech, playback start, barge-in)
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Elapsed time since the last activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Record the termination reason and stop every sub-loop. The first
    /// recorded reason wins; later calls only reinforce the stop signal.
    pub fn end(&self, reason: EndReason) {
        let mut slot = self.end_reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.stop.cancel();
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        *self.end_reason.lock()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// The remote agent finished an utterance: transcript + LLM history
    pub fn record_agent_turn(&self, text: &str) {
        info!(speaker = "agent", text, "utterance");
        self.transcript.lock().push(Turn::agent(text));
        self.history.lock().push(Turn::agent(text));
    }

    /// Our bot spoke (or is about to speak) a reply
    pub fn record_bot_turn(&self, text: &str) {
        info!(speaker = "bot", text, "utterance");
        self.transcript.lock().push(Turn::bot(text));
        self.history.lock().push(Turn::bot(text));
    }

    /// Transcript-only note, not part of the LLM history
    pub fn record_system_note(&self, text: &str) {
        self.transcript.lock().push(Turn::bot(text));
    }

    pub fn history_snapshot(&self) -> Vec<Turn> {
        self.history.lock().clone()
    }

    /// Turns recorded so far (both speakers)
    pub fn turn_count(&self) -> usize {
        self.transcript.lock().len()
    }

    /// Assemble the final transcript record
    pub fn finish_transcript(&self) -> CallTranscript {
        CallTranscript {
            scenario_id: self.scenario.id.clone(),
            scenario_name: self.scenario.name.clone(),
            call_sid: self.call_sid.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            end_reason: self.end_reason(),
            turns: self.transcript.lock().clone(),
        }
    }
}

/// One call's orchestration engine
pub struct CallSession {
    ctx: Arc<SessionContext>,
    services: Arc<Services>,
    media: Arc<dyn MediaSink>,
    timing: SessionTiming,
    stt_config: SttSessionConfig,
}

impl CallSession {
    pub fn new(
        scenario: Arc<Scenario>,
        stream_sid: String,
        call_sid: Option<String>,
        services: Arc<Services>,
        media: Arc<dyn MediaSink>,
        timing: SessionTiming,
        stt_config: SttSessionConfig,
    ) -> Self {
        let ctx = SessionContext::new(scenario, stream_sid, call_sid);
        Self {
            ctx,
            services,
            media,
            timing,
            stt_config,
        }
    }

    pub fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.ctx)
    }

    /// Drive the call from transport start to teardown.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundEvent>) {
        info!(
            stream_sid = %self.ctx.stream_sid,
            call_sid = ?self.ctx.call_sid,
            scenario = %self.ctx.scenario.id,
            "call session starting"
        );

        let (stt_tx, stt_rx) = mpsc::channel(64);
        let stt = match self
            .services
            .transcriber
            .open(self.stt_config.clone(), stt_tx)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to open transcription session; call will end");
                self.ctx
                    .record_system_note("[SYSTEM ERROR: transcription service unavailable]");
                self.finish().await;
                return;
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let pacer = tokio::spawn(
            FramePacer::new(Arc::clone(&self.ctx), Arc::clone(&self.media), &self.timing).run(),
        );
        let keepalive = tokio::spawn(
            KeepaliveMonitor::new(Arc::clone(&self.ctx), &self.timing).run(cmd_tx.clone()),
        );
        let worker = tokio::spawn(
            ResponseWorker::new(
                Arc::clone(&self.ctx),
                Arc::clone(&self.services),
                Arc::clone(&self.media),
                &self.timing,
            )
            .run(cmd_rx),
        );
        let accumulator =
            tokio::spawn(TurnAccumulator::new(Arc::clone(&self.ctx), &self.timing).run(stt_rx, cmd_tx));

        self.receive_loop(&mut inbound, stt.as_ref()).await;

        // Backstop: every exit path above records a reason, but make sure
        // the stop signal reaches the sub-loops regardless.
        self.ctx.end(EndReason::RemoteClosed);

        stt.close().await;

        match accumulator.await {
            Ok(residual) => {
                let residual = residual.trim();
                if !residual.is_empty() {
                    // Heard but never dispatched; keep it for the transcript.
                    self.ctx.record_agent_turn(residual);
                }
            }
            Err(e) => error!(error = %e, "turn accumulator panicked"),
        }

        for (name, handle) in [
            ("frame_pacer", pacer),
            ("keepalive", keepalive),
            ("response_worker", worker),
        ] {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "session task panicked");
            }
        }

        self.finish().await;
    }

    async fn receive_loop(&self, inbound: &mut mpsc::Receiver<InboundEvent>, stt: &dyn SttStream) {
        let stop = self.ctx.stop_token();
        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = inbound.recv() => event,
            };

            match event {
                None => {
                    self.ctx.end(EndReason::RemoteClosed);
                    break;
                }
                Some(InboundEvent::Media(audio)) => {
                    if let Err(e) = stt.push_audio(&audio).await {
                        warn!(error = %e, "failed to forward audio to transcription");
                    }
                }
                Some(InboundEvent::Stop) => {
                    info!("transport stop received");
                    self.ctx.end(EndReason::RemoteStop);
                    break;
                }
                Some(InboundEvent::Closed { code }) => {
                    info!(?code, "transport closed");
                    self.ctx.end(EndReason::TransportClosed { code });
                    break;
                }
                Some(InboundEvent::Failed(message)) => {
                    error!(%message, "transport receive failed");
                    self.ctx.end(EndReason::TransportError);
                    break;
                }
            }
        }
    }

    async fn finish(&self) {
        let transcript = self.ctx.finish_transcript();
        if let Err(e) = self.services.transcripts.persist(&transcript).await {
            error!(error = %e, "failed to persist transcript");
        }
        info!(
            scenario = %transcript.scenario_id,
            turns = transcript.turns.len(),
            reason = ?transcript.end_reason,
            duration_secs = transcript.duration_seconds(),
            "call finished"
        );
    }
}
