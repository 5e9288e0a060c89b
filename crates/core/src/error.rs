//! Error types shared across the workspace

use thiserror::Error;

/// Errors produced by the call engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Call control error: {0}")]
    CallControl(String),

    #[error("Transcript error: {0}")]
    Transcript(String),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Collaborator request failures are recovered locally (the turn is
    /// abandoned); everything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Generation(_) | Error::Synthesis(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Generation("timeout".into()).is_recoverable());
        assert!(Error::Synthesis("bad voice".into()).is_recoverable());
        assert!(!Error::Transport("socket closed".into()).is_recoverable());
        assert!(!Error::ChannelClosed.is_recoverable());
    }
}
