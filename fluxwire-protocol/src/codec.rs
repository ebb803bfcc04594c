//! Encoder for the chunked result stream.
//!
//! Writes exactly what `ChunkReader` reads: named-field maps for headers and
//! `[remaining, partial]` arrays for chunk markers. Used for fixtures, mock
//! servers and benchmarks.

use crate::error::ProtocolError;
use crate::header::{Message, Tags};
use crate::reader::EXT_TIMESTAMP;
use crate::value::Value;
use bytes::Bytes;
use rmp::encode;

/// Builds a result stream in memory.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(1024),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the encoded stream.
    pub fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }

    // =========================================================================
    // Headers
    // =========================================================================

    /// Writes `{results, error}`.
    pub fn response_header(
        &mut self,
        result_count: i64,
        error: Option<&str>,
    ) -> Result<&mut Self, ProtocolError> {
        self.map_len(2)?;
        self.str("results")?;
        encode::write_sint(&mut self.buf, result_count)?;
        self.error_field(error)?;
        Ok(self)
    }

    /// Writes `{id, error}`.
    pub fn result_header(&mut self, id: i64, error: Option<&str>) -> Result<&mut Self, ProtocolError> {
        self.map_len(2)?;
        self.str("id")?;
        encode::write_sint(&mut self.buf, id)?;
        self.error_field(error)?;
        Ok(self)
    }

    /// Writes `{id, messages, error}`.
    pub fn result_header_with_messages(
        &mut self,
        id: i64,
        messages: &[Message],
        error: Option<&str>,
    ) -> Result<&mut Self, ProtocolError> {
        self.map_len(3)?;
        self.str("id")?;
        encode::write_sint(&mut self.buf, id)?;
        self.str("messages")?;
        encode::write_array_len(&mut self.buf, messages.len() as u32)?;
        for message in messages {
            self.map_len(2)?;
            self.str("level")?;
            self.str(&message.level)?;
            self.str("text")?;
            self.str(&message.text)?;
        }
        self.error_field(error)?;
        Ok(self)
    }

    /// Writes a `[remaining, partial]` chunk marker.
    pub fn chunk_header(&mut self, remaining: u64, partial: bool) -> Result<&mut Self, ProtocolError> {
        encode::write_array_len(&mut self.buf, 2)?;
        encode::write_uint(&mut self.buf, remaining)?;
        encode::write_bool(&mut self.buf, partial)?;
        Ok(self)
    }

    /// Writes `{name, tags, columns, error}`.
    pub fn series_header(
        &mut self,
        name: Option<&str>,
        tags: &Tags,
        columns: &[&str],
        error: Option<&str>,
    ) -> Result<&mut Self, ProtocolError> {
        self.map_len(4)?;
        self.str("name")?;
        match name {
            Some(name) => self.str(name)?,
            None => self.nil()?,
        };
        self.str("tags")?;
        self.map_len(tags.len() as u32)?;
        for (k, v) in tags.iter() {
            self.str(k)?;
            self.str(v)?;
        }
        self.str("columns")?;
        encode::write_array_len(&mut self.buf, columns.len() as u32)?;
        for column in columns {
            self.str(column)?;
        }
        self.error_field(error)?;
        Ok(self)
    }

    /// Writes `{values, error}`.
    pub fn row(&mut self, values: &[Value], error: Option<&str>) -> Result<&mut Self, ProtocolError> {
        self.map_len(2)?;
        self.str("values")?;
        encode::write_array_len(&mut self.buf, values.len() as u32)?;
        for value in values {
            self.value(value)?;
        }
        self.error_field(error)?;
        Ok(self)
    }

    /// Writes a header that carries nothing but `{error}`. Valid at every
    /// level.
    pub fn error_header(&mut self, message: &str) -> Result<&mut Self, ProtocolError> {
        self.map_len(1)?;
        self.str("error")?;
        self.str(message)?;
        Ok(self)
    }

    fn error_field(&mut self, error: Option<&str>) -> Result<(), ProtocolError> {
        self.str("error")?;
        match error {
            Some(message) => self.str(message)?,
            None => self.nil()?,
        };
        Ok(())
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    pub fn map_len(&mut self, len: u32) -> Result<&mut Self, ProtocolError> {
        encode::write_map_len(&mut self.buf, len)?;
        Ok(self)
    }

    pub fn array_len(&mut self, len: u32) -> Result<&mut Self, ProtocolError> {
        encode::write_array_len(&mut self.buf, len)?;
        Ok(self)
    }

    pub fn str(&mut self, s: &str) -> Result<&mut Self, ProtocolError> {
        encode::write_str(&mut self.buf, s)?;
        Ok(self)
    }

    pub fn nil(&mut self) -> Result<&mut Self, ProtocolError> {
        encode::write_nil(&mut self.buf)?;
        Ok(self)
    }

    /// Appends raw bytes without any framing.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn value(&mut self, value: &Value) -> Result<&mut Self, ProtocolError> {
        match value {
            Value::Nil => encode::write_nil(&mut self.buf)?,
            Value::Bool(b) => encode::write_bool(&mut self.buf, *b)?,
            Value::Int(i) => {
                encode::write_sint(&mut self.buf, *i)?;
            }
            Value::UInt(u) => {
                encode::write_uint(&mut self.buf, *u)?;
            }
            Value::Float(f) => encode::write_f64(&mut self.buf, *f)?,
            Value::String(s) => encode::write_str(&mut self.buf, s)?,
            Value::Binary(b) => encode::write_bin(&mut self.buf, b)?,
            Value::Timestamp(t) => {
                // timestamp 96: u32 nanos, i64 seconds
                encode::write_ext_meta(&mut self.buf, 12, EXT_TIMESTAMP)?;
                self.buf
                    .extend_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
                self.buf.extend_from_slice(&t.timestamp().to_be_bytes());
            }
            Value::Array(items) => {
                encode::write_array_len(&mut self.buf, items.len() as u32)?;
                for item in items {
                    self.value(item)?;
                }
            }
            Value::Map(entries) => {
                encode::write_map_len(&mut self.buf, entries.len() as u32)?;
                for (k, v) in entries {
                    self.value(k)?;
                    self.value(v)?;
                }
            }
            Value::Ext(tag, data) => {
                encode::write_ext_meta(&mut self.buf, data.len() as u32, *tag)?;
                self.buf.extend_from_slice(data);
            }
        }
        Ok(self)
    }
}
