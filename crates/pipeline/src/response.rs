//! Response pipeline
//!
//! A single worker task owns the command channel and is the only producer
//! into the playback queue. Both the turn accumulator and the keepalive
//! monitor feed it, so flush-before-produce holds structurally: frames
//! from two generations can never interleave.
//!
//! At most one generation task runs at a time. Any new command supersedes
//! the active task: its cancellation token is triggered and the worker
//! waits for the task to observe it before proceeding.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use callprobe_core::{
    EndReason, FrameChunker, MediaSink, PlaybackFrame, END_CALL_MARKER,
};

use crate::session::{Services, SessionContext, SessionTiming};

/// Work orders for the response worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    /// New remote speech: interrupt any in-flight generation
    CancelActive,
    /// A completed utterance was appended to the history; produce and
    /// play a reply
    Respond { utterance: String },
    /// Keepalive filler: synthesize and play without consulting the
    /// generation collaborator
    SpeakFiller { text: String },
}

/// Owns the at-most-one-generation invariant
pub struct ResponseWorker {
    ctx: Arc<SessionContext>,
    services: Arc<Services>,
    media: Arc<dyn MediaSink>,
    hangup_grace: Duration,
    active: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ResponseWorker {
    pub fn new(
        ctx: Arc<SessionContext>,
        services: Arc<Services>,
        media: Arc<dyn MediaSink>,
        timing: &SessionTiming,
    ) -> Self {
        Self {
            ctx,
            services,
            media,
            hangup_grace: timing.hangup_grace,
            active: None,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        let stop = self.ctx.stop_token();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.supersede().await;
                    match cmd {
                        PipelineCommand::CancelActive => {}
                        PipelineCommand::Respond { utterance } => {
                            self.spawn(Generation::Reply { utterance });
                        }
                        PipelineCommand::SpeakFiller { text } => {
                            self.spawn(Generation::Filler { text });
                        }
                    }
                }
            }
        }
        self.supersede().await;
        debug!("response worker exiting");
    }

    /// Cancel the active generation task and wait until the cancellation
    /// has been observed.
    async fn supersede(&mut self) {
        if let Some((token, handle)) = self.active.take() {
            token.cancel();
            if let Err(e) = handle.await {
                error!(error = %e, "generation task panicked");
            }
        }
    }

    fn spawn(&mut self, generation: Generation) {
        let cancel = self.ctx.stop_token().child_token();
        let task = GenerationTask {
            ctx: Arc::clone(&self.ctx),
            services: Arc::clone(&self.services),
            media: Arc::clone(&self.media),
            hangup_grace: self.hangup_grace,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run(generation));
        self.active = Some((cancel, handle));
    }
}

enum Generation {
    Reply { utterance: String },
    Filler { text: String },
}

/// One in-flight "generate, synthesize, enqueue" unit of work
struct GenerationTask {
    ctx: Arc<SessionContext>,
    services: Arc<Services>,
    media: Arc<dyn MediaSink>,
    hangup_grace: Duration,
    cancel: CancellationToken,
}

impl GenerationTask {
    async fn run(self, generation: Generation) {
        match generation {
            Generation::Reply { utterance } => self.reply(&utterance).await,
            Generation::Filler { text } => self.filler(&text).await,
        }
        if self.cancel.is_cancelled() {
            // Barge-in observed: leave no stale audio behind.
            self.flush_playback().await;
        }
    }

    async fn reply(&self, utterance: &str) {
        debug!(utterance, "generating reply");

        // Interrupt current playback: drop unsent frames locally, then ask
        // the far end to discard what it has buffered.
        self.flush_playback().await;

        let history = self.ctx.history_snapshot();
        let reply = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self
                .services
                .responder
                .generate_reply(&history, &self.ctx.scenario.system_prompt) =>
            {
                match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "reply generation failed; turn abandoned");
                        return;
                    }
                }
            }
        };

        let wants_hangup = reply.contains(END_CALL_MARKER);
        let clean = reply.replace(END_CALL_MARKER, "").trim().to_string();

        if !clean.is_empty() {
            self.ctx.record_bot_turn(&clean);
            if !self.speak(&clean).await {
                return;
            }
        }

        if wants_hangup && !self.cancel.is_cancelled() {
            info!("end-of-call marker in reply; hanging up after grace period");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.hangup_grace) => {}
            }
            if let Some(call_sid) = &self.ctx.call_sid {
                if let Err(e) = self.services.call_control.terminate(call_sid).await {
                    warn!(error = %e, call_sid = %call_sid, "hangup request failed");
                }
            }
            self.ctx.end(EndReason::BotEnded);
        }
    }

    async fn filler(&self, text: &str) {
        debug!(text, "speaking keepalive filler");
        self.ctx.record_bot_turn(text);
        self.speak(text).await;
        self.ctx.touch();
    }

    /// Stream synthesis into the playback queue, repacking into fixed-size
    /// frames. Returns false if the turn was abandoned.
    async fn speak(&self, text: &str) -> bool {
        let voice = &self.ctx.scenario.voice;
        let mut stream = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            result = self.services.synthesizer.synthesize_stream(text, voice) => {
                match result {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "synthesis request failed; turn abandoned");
                        return false;
                    }
                }
            }
        };

        self.ctx.set_speaking(true);
        self.ctx.touch();

        let mut chunker = FrameChunker::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("synthesis interrupted");
                    return false;
                }
                chunk = stream.next() => match chunk {
                    None => break,
                    Some(Ok(bytes)) => {
                        for frame in chunker.push(&bytes) {
                            self.ctx.queue.push(PlaybackFrame::Audio(frame));
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "synthesis stream failed mid-turn");
                        self.flush_playback().await;
                        return false;
                    }
                }
            }
        }

        if let Some(frame) = chunker.flush() {
            self.ctx.queue.push(PlaybackFrame::Audio(frame));
        }
        self.ctx.queue.push(PlaybackFrame::EndOfTurn);
        true
    }

    async fn flush_playback(&self) {
        let discarded = self.ctx.queue.flush();
        if discarded > 0 {
            debug!(discarded, "flushed pending playback");
        }
        if let Err(e) = self.media.clear().await {
            warn!(error = %e, "failed to send clear instruction");
        }
        self.ctx.set_speaking(false);
        self.ctx.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use tokio::sync::mpsc;

    struct Harness {
        ctx: Arc<SessionContext>,
        media: Arc<RecordingMedia>,
        call_control: Arc<RecordingCallControl>,
        commands: mpsc::Sender<PipelineCommand>,
        worker: JoinHandle<()>,
    }

    fn harness(responder_reply: &str, synth: ChunkSynthesizer) -> Harness {
        let ctx = test_context();
        let media = Arc::new(RecordingMedia::default());
        let call_control = Arc::new(RecordingCallControl::default());
        let services = Arc::new(Services {
            transcriber: Arc::new(ScriptedTranscriber::default()),
            responder: Arc::new(StaticResponder::new(responder_reply)),
            synthesizer: Arc::new(synth),
            call_control: call_control.clone(),
            transcripts: Arc::new(MemoryTranscripts::default()),
        });
        let (tx, rx) = mpsc::channel(16);
        let worker = ResponseWorker::new(
            Arc::clone(&ctx),
            services,
            media.clone(),
            &test_timing(),
        );
        let handle = tokio::spawn(worker.run(rx));
        Harness {
            ctx,
            media,
            call_control,
            commands: tx,
            worker: handle,
        }
    }

    fn queue_contents(ctx: &SessionContext) -> Vec<PlaybackFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = ctx.queue.pop() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_is_framed_and_terminated_with_marker() {
        // 480 synthesis bytes repack into exactly three 160-byte frames
        let h = harness("Sure, Tuesday works.", ChunkSynthesizer::bytes(vec![240, 240]));

        h.commands
            .send(PipelineCommand::Respond { utterance: "any day".into() })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let frames = queue_contents(&h.ctx);
        assert_eq!(frames.len(), 4);
        assert!(matches!(frames[3], PlaybackFrame::EndOfTurn));
        for frame in &frames[..3] {
            assert!(matches!(frame, PlaybackFrame::Audio(bytes) if bytes.len() == 160));
        }

        let history = h.ctx.history_snapshot();
        assert_eq!(history.last().unwrap().text, "Sure, Tuesday works.");
        assert!(h.ctx.is_speaking());

        h.ctx.end(EndReason::RemoteStop);
        h.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_barge_in_cancels_and_flushes_before_next_task() {
        // slow synthesis so the cancel lands mid-stream
        let h = harness("Long reply.", ChunkSynthesizer::slow(20, Duration::from_millis(50)));

        h.commands
            .send(PipelineCommand::Respond { utterance: "hello".into() })
            .await
            .unwrap();
        // let a few frames trickle into the queue
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!h.ctx.queue.is_empty());

        h.commands.send(PipelineCommand::CancelActive).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(
            h.ctx.queue.is_empty(),
            "queue must be empty once cancellation completes"
        );
        assert!(h.media.clears() >= 1, "far end must be told to discard audio");
        assert!(!h.ctx.is_speaking());

        // repeated cancellations never leave stale frames
        h.commands.send(PipelineCommand::CancelActive).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.ctx.queue.is_empty());

        h.ctx.end(EndReason::RemoteStop);
        h.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_marker_is_stripped_and_hangs_up() {
        let h = harness(
            "Thanks, goodbye! [END_CALL]",
            ChunkSynthesizer::bytes(vec![160]),
        );

        h.commands
            .send(PipelineCommand::Respond { utterance: "all done".into() })
            .await
            .unwrap();
        // synthesis + grace period
        tokio::time::sleep(Duration::from_secs(5)).await;

        let history = h.ctx.history_snapshot();
        let spoken = history.last().unwrap().text.as_str();
        assert_eq!(spoken, "Thanks, goodbye!");
        assert!(!spoken.contains(END_CALL_MARKER));

        assert_eq!(h.call_control.terminated(), vec!["CA-test".to_string()]);
        assert_eq!(h.ctx.end_reason(), Some(EndReason::BotEnded));
        h.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_leaves_session_listening() {
        let ctx = test_context();
        let media = Arc::new(RecordingMedia::default());
        let services = Arc::new(Services {
            transcriber: Arc::new(ScriptedTranscriber::default()),
            responder: Arc::new(FailingResponder),
            synthesizer: Arc::new(ChunkSynthesizer::bytes(vec![160])),
            call_control: Arc::new(RecordingCallControl::default()),
            transcripts: Arc::new(MemoryTranscripts::default()),
        });
        let (tx, rx) = mpsc::channel(16);
        let worker = ResponseWorker::new(Arc::clone(&ctx), services, media, &test_timing());
        let handle = tokio::spawn(worker.run(rx));

        tx.send(PipelineCommand::Respond { utterance: "hello".into() })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(ctx.queue.is_empty(), "no frames may be enqueued on failure");
        assert!(ctx.end_reason().is_none(), "session stays open");
        assert!(ctx.history_snapshot().is_empty());

        ctx.end(EndReason::RemoteStop);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_filler_goes_through_the_synthesis_path() {
        let h = harness("unused", ChunkSynthesizer::bytes(vec![320]));

        h.commands
            .send(PipelineCommand::SpeakFiller { text: "Hello? Are you still there?".into() })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let frames = queue_contents(&h.ctx);
        assert_eq!(frames.len(), 3); // two audio frames + end-of-turn
        assert!(matches!(frames.last(), Some(PlaybackFrame::EndOfTurn)));
        assert_eq!(
            h.ctx.history_snapshot().last().unwrap().text,
            "Hello? Are you still there?"
        );

        h.ctx.end(EndReason::RemoteStop);
        h.worker.await.unwrap();
    }
}
