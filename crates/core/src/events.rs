//! Events exchanged between the transport, the transcription collaborator,
//! and the call engine

use serde::{Deserialize, Serialize};

/// A transcription result delivered by the STT collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A confirmed fragment of remote speech
    PartialFinal(String),
    /// The transcription service detected a silence long enough to end
    /// the speaker's turn
    TurnBoundary,
}

/// An inbound transport event, as seen by the session controller.
///
/// The server's WebSocket loop translates raw Media Streams messages into
/// these; the `start` event is consumed before the session is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One chunk of inbound μ-law audio
    Media(Vec<u8>),
    /// The transport's explicit stop signal
    Stop,
    /// Transport-level close frame, with its code if one was sent
    Closed { code: Option<u16> },
    /// The receive loop failed with a protocol or I/O error
    Failed(String),
}

/// Why a session ended. Once recorded it is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The transport stream ended without a stop signal
    RemoteClosed,
    /// The transport sent an explicit stop event
    RemoteStop,
    /// Transport-level close frame, with its code if one was sent
    TransportClosed { code: Option<u16> },
    /// A receive or send failure on the transport
    TransportError,
    /// The bot hung up after an end-of-call marker in its reply
    BotEnded,
}

impl EndReason {
    /// Whether our side initiated the termination
    pub fn bot_initiated(&self) -> bool {
        matches!(self, EndReason::BotEnded)
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::RemoteClosed => write!(f, "remote_closed"),
            EndReason::RemoteStop => write!(f, "remote_stop"),
            EndReason::TransportClosed { code: Some(code) } => {
                write!(f, "transport_closed({code})")
            }
            EndReason::TransportClosed { code: None } => write!(f, "transport_closed"),
            EndReason::TransportError => write!(f, "transport_error"),
            EndReason::BotEnded => write!(f, "bot_ended"),
        }
    }
}
