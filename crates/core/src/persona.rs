//! Patient persona configuration

use serde::{Deserialize, Serialize};

/// One simulated-patient persona, selected per call.
///
/// The system prompt carries the full character instructions; the opening
/// line is what the patient leads with if the agent under test never
/// speaks first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Synthesis voice id (a Deepgram Aura model)
    pub voice: String,
    pub system_prompt: String,
    pub opening_line: String,
}
