//! Playback queue and outbound frame pacer
//!
//! The queue is the only hand-off point between reply generation and the
//! transport. The pacer drains it at the fixed frame cadence: sending
//! faster overruns the far end's jitter buffer, sending slower leaves
//! audible gaps. While nobody is speaking it keeps the stream alive with
//! μ-law silence frames.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use callprobe_core::{silence_frame, EndReason, MediaSink, PlaybackFrame};

use crate::session::{SessionContext, SessionTiming};

/// Ordered buffer of frames awaiting transmission.
///
/// Frames are never reordered; `flush` atomically discards everything
/// pending. One producer (the response worker) and one consumer (the
/// pacer) at a time.
#[derive(Default)]
pub struct PlaybackQueue {
    frames: Mutex<VecDeque<PlaybackFrame>>,
    notify: Notify,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: PlaybackFrame) {
        self.frames.lock().push_back(frame);
        self.notify.notify_one();
    }

    /// Non-blocking pop in insertion order
    pub fn pop(&self) -> Option<PlaybackFrame> {
        self.frames.lock().pop_front()
    }

    /// Wait for the next frame
    pub async fn next(&self) -> PlaybackFrame {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.pop() {
                return frame;
            }
            notified.await;
        }
    }

    /// Discard everything pending; returns how many entries were dropped
    pub fn flush(&self) -> usize {
        let mut frames = self.frames.lock();
        let discarded = frames.len();
        frames.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

/// Paces queued frames onto the transport at the nominal frame cadence
pub struct FramePacer {
    ctx: Arc<SessionContext>,
    media: Arc<dyn MediaSink>,
    frame_duration: Duration,
    idle_frame_interval: Duration,
}

impl FramePacer {
    pub fn new(ctx: Arc<SessionContext>, media: Arc<dyn MediaSink>, timing: &SessionTiming) -> Self {
        Self {
            ctx,
            media,
            frame_duration: timing.frame_duration,
            idle_frame_interval: timing.idle_frame_interval,
        }
    }

    pub async fn run(self) {
        let stop = self.ctx.stop_token();
        let mut ticker = interval(self.frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_idle_frame = Instant::now();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // One audio frame per tick. End-of-turn markers are drained
            // without consuming the slot.
            let mut outgoing = None;
            while let Some(frame) = self.ctx.queue.pop() {
                match frame {
                    PlaybackFrame::Audio(bytes) => {
                        outgoing = Some(bytes);
                        break;
                    }
                    PlaybackFrame::EndOfTurn => {
                        self.ctx.set_speaking(false);
                    }
                }
            }

            match outgoing {
                Some(bytes) => {
                    if let Err(e) = self.media.send_audio(&bytes).await {
                        warn!(error = %e, "outbound send failed; ending session");
                        self.ctx.end(EndReason::TransportError);
                        break;
                    }
                }
                None => {
                    // Queue empty: keep the stream alive so intermediary
                    // timeouts do not tear the call down.
                    if last_idle_frame.elapsed() >= self.idle_frame_interval {
                        if let Err(e) = self.media.send_audio(&silence_frame()).await {
                            warn!(error = %e, "outbound send failed; ending session");
                            self.ctx.end(EndReason::TransportError);
                            break;
                        }
                        last_idle_frame = Instant::now();
                    }
                }
            }
        }

        debug!("frame pacer exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use callprobe_core::MULAW_SILENCE;

    #[test]
    fn test_queue_preserves_insertion_order() {
        let queue = PlaybackQueue::new();
        queue.push(PlaybackFrame::Audio(vec![1]));
        queue.push(PlaybackFrame::Audio(vec![2]));
        queue.push(PlaybackFrame::EndOfTurn);

        assert_eq!(queue.pop(), Some(PlaybackFrame::Audio(vec![1])));
        assert_eq!(queue.pop(), Some(PlaybackFrame::Audio(vec![2])));
        assert_eq!(queue.pop(), Some(PlaybackFrame::EndOfTurn));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_queue_flush_discards_everything() {
        let queue = PlaybackQueue::new();
        queue.push(PlaybackFrame::Audio(vec![1]));
        queue.push(PlaybackFrame::Audio(vec![2]));
        assert_eq!(queue.flush(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.flush(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_sends_in_order_at_frame_cadence() {
        let ctx = test_context();
        let media = Arc::new(RecordingMedia::default());
        for n in 0..3u8 {
            ctx.queue.push(PlaybackFrame::Audio(vec![n; 160]));
        }

        let pacer = FramePacer::new(Arc::clone(&ctx), media.clone(), &test_timing());
        let handle = tokio::spawn(pacer.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.end(EndReason::RemoteStop);
        handle.await.unwrap();

        let sent = media.sent();
        let audio: Vec<_> = sent.iter().filter(|(_, f)| f[0] != MULAW_SILENCE).collect();
        assert_eq!(audio.len(), 3);
        for (n, (_, frame)) in audio.iter().enumerate() {
            assert_eq!(frame[0], n as u8);
        }
        for pair in audio.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_fills_idle_gaps_with_silence() {
        let ctx = test_context();
        let media = Arc::new(RecordingMedia::default());
        let pacer = FramePacer::new(Arc::clone(&ctx), media.clone(), &test_timing());
        let handle = tokio::spawn(pacer.run());

        // one second of nobody speaking
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.end(EndReason::RemoteStop);
        handle.await.unwrap();

        let sent = media.sent();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|(_, f)| f.iter().all(|&b| b == MULAW_SILENCE)));
        // idle filler paced at the idle interval, not every tick
        for pair in sent.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_turn_clears_speaking_without_losing_a_slot() {
        let ctx = test_context();
        ctx.set_speaking(true);
        let media = Arc::new(RecordingMedia::default());
        ctx.queue.push(PlaybackFrame::Audio(vec![1; 160]));
        ctx.queue.push(PlaybackFrame::EndOfTurn);
        ctx.queue.push(PlaybackFrame::Audio(vec![2; 160]));

        let pacer = FramePacer::new(Arc::clone(&ctx), media.clone(), &test_timing());
        let handle = tokio::spawn(pacer.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ctx.is_speaking());
        ctx.end(EndReason::RemoteStop);
        handle.await.unwrap();

        let audio: Vec<_> = media
            .sent()
            .into_iter()
            .filter(|(_, f)| f[0] != MULAW_SILENCE)
            .collect();
        assert_eq!(audio.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_ends_the_session() {
        let ctx = test_context();
        let media = Arc::new(RecordingMedia::default());
        media.fail_sends();
        ctx.queue.push(PlaybackFrame::Audio(vec![1; 160]));

        FramePacer::new(Arc::clone(&ctx), media, &test_timing())
            .run()
            .await;

        assert_eq!(ctx.end_reason(), Some(EndReason::TransportError));
        assert!(ctx.stop_token().is_cancelled());
    }
}
