//! Protocol error types.

use rmp::Marker;
use thiserror::Error;

/// Errors raised while reading or writing the result stream.
///
/// Every variant except `Io` means the byte stream no longer matches the
/// expected framing (version mismatch or corruption). `Io` is a failure of
/// the underlying transport. Both are fatal for the stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected marker: expected {expected}, got {found:?}")]
    UnexpectedMarker { expected: &'static str, found: Marker },

    #[error("reserved marker byte {0:#04x}")]
    ReservedMarker(u8),

    #[error("expected array of size 2: got {0}")]
    InvalidChunkHeader(u32),

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("declared length too large: {len} (max {max})")]
    LengthLimitExceeded { len: usize, max: usize },

    #[error("integer out of range: {0}")]
    IntegerOverflow(u64),

    #[error("negative element count: {0}")]
    NegativeCount(i64),

    #[error("values nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("invalid timestamp extension ({len} bytes)")]
    InvalidTimestamp { len: usize },

    #[error("encode error: {0}")]
    Encode(#[from] rmp::encode::ValueWriteError),

    #[error("stream is unusable after a previous error")]
    Unusable,
}

impl ProtocolError {
    /// Returns whether this error came from the byte source rather than
    /// from malformed data.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }

    /// Returns whether the source ran dry in the middle of a structure.
    pub fn is_truncated(&self) -> bool {
        matches!(self, ProtocolError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
