//! Audio frame types and μ-law frame repacking
//!
//! The whole system speaks one fixed narrowband format: 8 kHz mono μ-law,
//! paced onto the telephony transport in 20 ms frames of 160 bytes.

/// Bytes in one 20 ms frame of 8 kHz μ-law audio
pub const MULAW_FRAME_BYTES: usize = 160;

/// μ-law encoding of a zero-amplitude sample
pub const MULAW_SILENCE: u8 = 0xFF;

/// One frame of comfort-noise-free silence
pub fn silence_frame() -> Vec<u8> {
    vec![MULAW_SILENCE; MULAW_FRAME_BYTES]
}

/// A unit queued for outbound playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackFrame {
    /// One fixed-duration frame of μ-law audio
    Audio(Vec<u8>),
    /// Marker emitted after the last frame of a spoken reply
    EndOfTurn,
}

/// Repacks arbitrarily-sized synthesis chunks into fixed-size frames.
///
/// Synthesis providers stream bytes in whatever chunk sizes their HTTP
/// stack produces; the transport wants exact 20 ms frames. The chunker
/// carries the remainder across chunks and pads the final short frame
/// with silence on [`FrameChunker::flush`].
#[derive(Debug, Default)]
pub struct FrameChunker {
    pending: Vec<u8>,
}

impl FrameChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every complete frame now available.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.pending.len() / MULAW_FRAME_BYTES);
        while self.pending.len() >= MULAW_FRAME_BYTES {
            let rest = self.pending.split_off(MULAW_FRAME_BYTES);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Drain the remainder as one final frame, padded to full size.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut frame = std::mem::take(&mut self.pending);
        frame.resize(MULAW_FRAME_BYTES, MULAW_SILENCE);
        Some(frame)
    }
}
