//! # fluxwire-client
//!
//! Streaming decoder for chunked query responses.
//!
//! This crate provides:
//! - `Cursor`, which owns the byte source and yields results
//! - `ResultSet` and `Series`, borrowing handles that yield series and rows
//! - Discard at every level, keeping the stream positioned for the next read
//! - Inline server errors kept separate from fatal protocol/transport errors
//!
//! ```no_run
//! use fluxwire_client::{Cursor, CursorError, DecoderConfig, Format};
//!
//! # fn main() -> Result<(), CursorError> {
//! let body = std::fs::File::open("response.msgpack")?;
//! let mut cursor = Cursor::from_reader(body, Format::MessagePack, DecoderConfig::from_env())?;
//! while let Some(mut result) = cursor.next_result()? {
//!     while let Some(mut series) = result.next_series()? {
//!         while let Some(row) = series.next_row()? {
//!             println!("{} {:?}", series.name(), row.values());
//!         }
//!     }
//! }
//! cursor.close()?;
//! # Ok(())
//! # }
//! ```

mod chunk;
pub mod config;
pub mod cursor;
pub mod error;
pub mod result;
pub mod row;
pub mod series;

pub use config::DecoderConfig;
pub use cursor::Cursor;
pub use error::{CursorError, ErrorLevel};
pub use result::ResultSet;
pub use row::Row;
pub use series::Series;

pub use fluxwire_protocol::{
    ByteSource, BytesSource, Format, Message, ReaderSource, Tags, Timestamp, Value,
};
