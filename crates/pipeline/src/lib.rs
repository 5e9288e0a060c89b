//! Per-call real-time audio orchestration engine
//!
//! One [`CallSession`] bridges a live telephony audio stream to three
//! collaborators (streaming STT, reply generation, and streaming TTS)
//! while enforcing turn-taking, barge-in, 20 ms playback pacing, idle
//! keepalive, and call termination.
//!
//! Task topology per call (all cooperating through the command channel and
//! the shared [`SessionContext`]):
//! - inbound receive loop (driven by the session controller)
//! - outbound frame pacer
//! - turn accumulator consuming transcription events
//! - a single response worker owning the playback queue's producer side
//! - keepalive monitor

pub mod accumulator;
pub mod keepalive;
pub mod playback;
pub mod response;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::TurnAccumulator;
pub use keepalive::KeepaliveMonitor;
pub use playback::{FramePacer, PlaybackQueue};
pub use response::{PipelineCommand, ResponseWorker};
pub use session::{CallSession, Services, SessionContext, SessionTiming};
