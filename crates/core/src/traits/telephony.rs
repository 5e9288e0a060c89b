//! Telephony-side collaborator traits

use async_trait::async_trait;

use crate::conversation::CallTranscript;
use crate::Result;

/// Call-control collaborator. Best effort: callers log failures and move on.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// End a call in progress
    async fn terminate(&self, call_sid: &str) -> Result<()>;
}

/// Outbound half of the media transport
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Send one fixed-size audio frame to the far end
    async fn send_audio(&self, frame: &[u8]) -> Result<()>;

    /// Tell the far end to discard any audio it has buffered but not
    /// yet played
    async fn clear(&self) -> Result<()>;
}

/// Transcript persistence collaborator. Write semantics and format are its
/// concern; the engine hands over the finished record exactly once.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn persist(&self, transcript: &CallTranscript) -> Result<()>;
}
