//! # fluxwire-protocol
//!
//! Wire layer for the fluxwire query result stream.
//!
//! This crate provides:
//! - The transport boundary (`ByteSource`) and two stock sources
//! - `ChunkReader`, the MessagePack primitive reader (values, headers, skips)
//! - Header types for the four nesting levels and the chunk marker
//! - The `FrameDecoder` capability trait and format negotiation
//! - An `Encoder` that writes the chunked result format

pub mod codec;
pub mod decoder;
pub mod error;
pub mod header;
pub mod reader;
pub mod source;
pub mod value;

pub use codec::Encoder;
pub use decoder::{Decoder, Format, FrameDecoder, UnknownFormat};
pub use error::ProtocolError;
pub use header::{
    ChunkHeader, Message, ResponseHeader, ResultHeader, RowRecord, SeriesHeader, Tags,
};
pub use reader::ChunkReader;
pub use source::{ByteSource, BytesSource, ReaderSource};
pub use value::{Timestamp, Value};

/// Short format identifier for the MessagePack result stream.
pub const FORMAT_MSGPACK: &str = "msgpack";

/// MIME type for the MessagePack result stream.
pub const MIME_MSGPACK: &str = "application/x-msgpack";

/// Maximum declared string/binary/array/map length (16 Mi).
pub const MAX_CONTAINER_LEN: usize = 16 * 1024 * 1024;

/// Name of the column holding the row timestamp.
pub const TIME_COLUMN: &str = "time";
