//! Conversation turns and call transcripts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EndReason;

/// Which party spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The AI voice agent under test (the far end of the call)
    Agent,
    /// Our simulated patient bot
    Bot,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Agent => "agent",
            Speaker::Bot => "bot",
        }
    }

    /// Chat-completion role this speaker maps to. The agent under test is
    /// the "user" from the patient model's point of view.
    pub fn chat_role(&self) -> &'static str {
        match self {
            Speaker::Agent => "user",
            Speaker::Bot => "assistant",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single utterance in the conversation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Speaker::Agent, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Speaker::Bot, text)
    }
}

/// The full record of one call, handed to the transcript sink at session end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTranscript {
    pub scenario_id: String,
    pub scenario_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    pub turns: Vec<Turn>,
}

impl CallTranscript {
    pub fn duration_seconds(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
