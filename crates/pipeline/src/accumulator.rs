//! Turn accumulator
//!
//! Merges incremental transcription fragments into one utterance and
//! decides when the remote speaker has finished a turn. Dispatch is
//! debounced by a short settle delay after the boundary signal, because
//! transcription services sometimes emit the boundary fractionally before
//! the final punctuated fragment arrives. Newer speech always supersedes a
//! scheduled dispatch and cancels any in-flight reply generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use callprobe_core::TranscriptEvent;

use crate::response::PipelineCommand;
use crate::session::{SessionContext, SessionTiming};

pub struct TurnAccumulator {
    ctx: Arc<SessionContext>,
    settle_delay: Duration,
}

impl TurnAccumulator {
    pub fn new(ctx: Arc<SessionContext>, timing: &SessionTiming) -> Self {
        Self {
            ctx,
            settle_delay: timing.settle_delay,
        }
    }

    /// Consume transcription events until the session stops or the event
    /// channel closes. Returns any text heard but never dispatched, so the
    /// controller can record it for transcript completeness.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<TranscriptEvent>,
        commands: mpsc::Sender<PipelineCommand>,
    ) -> String {
        let stop = self.ctx.stop_token();
        let mut pending = String::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let settle_at = deadline;
            let settle = async move {
                match settle_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = stop.cancelled() => break,

                _ = settle => {
                    deadline = None;
                    let utterance = std::mem::take(&mut pending);
                    let utterance = utterance.trim();
                    if !utterance.is_empty() {
                        self.ctx.record_agent_turn(utterance);
                        let dispatch = PipelineCommand::Respond {
                            utterance: utterance.to_string(),
                        };
                        if commands.send(dispatch).await.is_err() {
                            break;
                        }
                    }
                }

                event = events.recv() => match event {
                    None => break,
                    Some(TranscriptEvent::PartialFinal(text)) => {
                        let fragment = text.trim();
                        if fragment.is_empty() {
                            continue;
                        }
                        self.ctx.touch();
                        // New speech wins: drop any scheduled dispatch and
                        // interrupt whatever reply is in flight.
                        deadline = None;
                        if !pending.is_empty() {
                            pending.push(' ');
                        }
                        pending.push_str(fragment);
                        if commands.send(PipelineCommand::CancelActive).await.is_err() {
                            break;
                        }
                    }
                    Some(TranscriptEvent::TurnBoundary) => {
                        if !pending.trim().is_empty() {
                            debug!(pending = %pending, "turn boundary; settling");
                            deadline = Some(Instant::now() + self.settle_delay);
                        }
                    }
                },
            }
        }

        pending
    }
}
