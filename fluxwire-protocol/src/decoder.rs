//! Format negotiation and the decoder capability trait.

use crate::error::ProtocolError;
use crate::header::{ChunkHeader, ResponseHeader, ResultHeader, RowRecord, SeriesHeader};
use crate::reader::ChunkReader;
use crate::source::ByteSource;
use crate::{FORMAT_MSGPACK, MIME_MSGPACK};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a caller asks for a result format nobody implements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown format: {0}")]
pub struct UnknownFormat(pub String);

/// Result stream formats this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[serde(rename = "msgpack", alias = "application/x-msgpack")]
    MessagePack,
}

impl Format {
    /// Every supported format.
    pub const ALL: [Format; 1] = [Format::MessagePack];

    /// Canonical MIME type, suitable for an `Accept` header.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::MessagePack => MIME_MSGPACK,
        }
    }

    /// Short identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Format::MessagePack => FORMAT_MSGPACK,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FORMAT_MSGPACK | MIME_MSGPACK => Ok(Format::MessagePack),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// Level-aware reads a cursor needs from a wire format.
///
/// The trait is object safe; result, series and row handles hold a
/// `&mut dyn FrameDecoder` so they stay independent of the format and of
/// the byte source type.
pub trait FrameDecoder {
    fn read_response_header(&mut self) -> Result<ResponseHeader, ProtocolError>;

    /// Returns `None` when the stream ends cleanly before a result header.
    fn read_result_header(&mut self) -> Result<Option<ResultHeader>, ProtocolError>;

    fn read_chunk_header(&mut self) -> Result<ChunkHeader, ProtocolError>;

    fn read_series_header(&mut self) -> Result<SeriesHeader, ProtocolError>;

    fn read_row(&mut self) -> Result<RowRecord, ProtocolError>;

    /// Skips one row without constructing its values.
    fn skip_row(&mut self) -> Result<(), ProtocolError>;

    /// Releases the byte source.
    fn close(&mut self) -> Result<(), ProtocolError>;
}

impl<S: ByteSource> FrameDecoder for ChunkReader<S> {
    fn read_response_header(&mut self) -> Result<ResponseHeader, ProtocolError> {
        ChunkReader::read_response_header(self)
    }

    fn read_result_header(&mut self) -> Result<Option<ResultHeader>, ProtocolError> {
        ChunkReader::read_result_header(self)
    }

    fn read_chunk_header(&mut self) -> Result<ChunkHeader, ProtocolError> {
        ChunkReader::read_chunk_header(self)
    }

    fn read_series_header(&mut self) -> Result<SeriesHeader, ProtocolError> {
        ChunkReader::read_series_header(self)
    }

    fn read_row(&mut self) -> Result<RowRecord, ProtocolError> {
        ChunkReader::read_row(self)
    }

    fn skip_row(&mut self) -> Result<(), ProtocolError> {
        self.skip_value()
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        ChunkReader::close(self)
    }
}

/// A decoder for one negotiated format over a byte source.
pub enum Decoder<S> {
    MessagePack(ChunkReader<S>),
}

impl<S: ByteSource> Decoder<S> {
    pub fn new(source: S, format: Format) -> Self {
        match format {
            Format::MessagePack => Decoder::MessagePack(ChunkReader::new(source)),
        }
    }

    /// Applies a maximum declared container length.
    pub fn with_max_len(self, max_len: usize) -> Self {
        match self {
            Decoder::MessagePack(reader) => Decoder::MessagePack(reader.with_max_len(max_len)),
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Decoder::MessagePack(_) => Format::MessagePack,
        }
    }

    pub fn get_ref(&self) -> &S {
        match self {
            Decoder::MessagePack(reader) => reader.get_ref(),
        }
    }

    fn inner(&mut self) -> &mut dyn FrameDecoder {
        match self {
            Decoder::MessagePack(reader) => reader,
        }
    }
}

impl<S: ByteSource> FrameDecoder for Decoder<S> {
    fn read_response_header(&mut self) -> Result<ResponseHeader, ProtocolError> {
        self.inner().read_response_header()
    }

    fn read_result_header(&mut self) -> Result<Option<ResultHeader>, ProtocolError> {
        self.inner().read_result_header()
    }

    fn read_chunk_header(&mut self) -> Result<ChunkHeader, ProtocolError> {
        self.inner().read_chunk_header()
    }

    fn read_series_header(&mut self) -> Result<SeriesHeader, ProtocolError> {
        self.inner().read_series_header()
    }

    fn read_row(&mut self) -> Result<RowRecord, ProtocolError> {
        self.inner().read_row()
    }

    fn skip_row(&mut self) -> Result<(), ProtocolError> {
        self.inner().skip_row()
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        self.inner().close()
    }
}
