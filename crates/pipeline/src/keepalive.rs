//! Keepalive monitor
//!
//! Watches the activity clock and injects a short spoken prompt when the
//! line has been silent too long, keeping the media transport and the
//! remote agent engaged. Fillers go through the response worker's command
//! channel, so they are serialized with reply generation and can never
//! interleave with another task's frames.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::response::PipelineCommand;
use crate::session::{SessionContext, SessionTiming};

/// Rotating prompts spoken into prolonged silence
pub const FILLER_PROMPTS: [&str; 3] = [
    "Hello? Are you still there?",
    "Hi, sorry, can you hear me?",
    "I'm still here.",
];

pub struct KeepaliveMonitor {
    ctx: Arc<SessionContext>,
    poll: Duration,
    threshold: Duration,
}

impl KeepaliveMonitor {
    pub fn new(ctx: Arc<SessionContext>, timing: &SessionTiming) -> Self {
        Self {
            ctx,
            poll: timing.keepalive_poll,
            threshold: timing.silence_threshold,
        }
    }

    pub async fn run(self, commands: mpsc::Sender<PipelineCommand>) {
        let stop = self.ctx.stop_token();
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_filler = 0usize;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.ctx.is_speaking() {
                continue;
            }
            if self.ctx.idle_for() < self.threshold {
                continue;
            }

            // Nothing said yet: lead with the persona's opening line
            // instead of a generic filler.
            let text = if self.ctx.turn_count() == 0 {
                self.ctx.scenario.opening_line.clone()
            } else {
                let prompt = FILLER_PROMPTS[next_filler % FILLER_PROMPTS.len()];
                next_filler += 1;
                prompt.to_string()
            };

            info!(text = %text, "prolonged silence; injecting filler prompt");
            if commands
                .send(PipelineCommand::SpeakFiller { text })
                .await
                .is_err()
            {
                break;
            }
            self.ctx.touch();
        }

        debug!("keepalive monitor exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn spawn_monitor(
        ctx: Arc<SessionContext>,
    ) -> (
        mpsc::Receiver<PipelineCommand>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let monitor = KeepaliveMonitor::new(ctx, &test_timing());
        let handle = tokio::spawn(monitor.run(tx));
        (rx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_per_silence_window() {
        let ctx = test_context();
        let (mut commands, handle) = spawn_monitor(Arc::clone(&ctx));

        // silence threshold in test timing is 10 s
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let first = commands.try_recv().expect("filler after threshold");
        assert!(matches!(first, PipelineCommand::SpeakFiller { .. }));
        assert!(
            commands.try_recv().is_err(),
            "activity reset must prevent an immediate second filler"
        );

        // and again after another full window
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert!(commands.try_recv().is_ok());

        ctx.end(callprobe_core::EndReason::RemoteStop);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_with_the_persona_line_then_rotates() {
        let ctx = test_context();
        let (mut commands, handle) = spawn_monitor(Arc::clone(&ctx));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        match commands.try_recv().unwrap() {
            PipelineCommand::SpeakFiller { text } => {
                assert_eq!(text, ctx.scenario.opening_line);
            }
            other => panic!("unexpected command {other:?}"),
        }

        // once the conversation has turns, generic fillers rotate in
        ctx.record_agent_turn("hello?");
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        match commands.try_recv().unwrap() {
            PipelineCommand::SpeakFiller { text } => {
                assert_eq!(text, FILLER_PROMPTS[0]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        ctx.end(callprobe_core::EndReason::RemoteStop);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_while_speaking() {
        let ctx = test_context();
        ctx.set_speaking(true);
        let (mut commands, handle) = spawn_monitor(Arc::clone(&ctx));

        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert!(commands.try_recv().is_err());

        ctx.end(callprobe_core::EndReason::RemoteStop);
        handle.await.unwrap();
    }
}
