//! Reply generation collaborator trait

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::Result;

/// Text-generation collaborator producing the patient's next line.
///
/// The reply may contain [`crate::END_CALL_MARKER`] to signal the bot
/// should hang up after speaking. A failure here must never be fatal to
/// the session; the engine abandons the turn and keeps listening.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_reply(&self, history: &[Turn], persona_prompt: &str) -> Result<String>;
}
