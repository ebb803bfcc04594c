//! Per-level chunk bookkeeping shared by result and series decoding.

use fluxwire_protocol::{ChunkHeader, FrameDecoder, ProtocolError};

/// Tracks the `[remaining, partial]` markers of one nesting level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChunkState {
    /// Elements left in the current chunk.
    pub remaining: u64,
    /// The last marker read had `partial == false`.
    pub complete: bool,
    /// Sum of `remaining` over every marker read so far.
    pub known: u64,
}

impl ChunkState {
    pub fn primed(header: ChunkHeader) -> Self {
        let mut state = Self::default();
        state.absorb(header);
        state
    }

    pub fn absorb(&mut self, header: ChunkHeader) {
        self.remaining = header.remaining;
        self.complete = header.complete;
        self.known += header.remaining;
    }

    /// Reads markers until an element is available. Returns `false` once
    /// the level is exhausted.
    pub fn ready(&mut self, decoder: &mut dyn FrameDecoder) -> Result<bool, ProtocolError> {
        while self.remaining == 0 {
            if self.complete {
                return Ok(false);
            }
            let header = decoder.read_chunk_header()?;
            self.absorb(header);
        }
        Ok(true)
    }

    pub fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Drained the current chunk while more chunks follow.
    pub fn needs_header(&self) -> bool {
        self.remaining == 0 && !self.complete
    }
}
