//! MessagePack chunk reader.
//!
//! `ChunkReader` reads one value, one container header, or skips one value
//! from a `ByteSource` without interpreting what comes next. Header structs
//! are MessagePack maps keyed by field name; unknown keys are skipped and
//! only the shape is validated.
//!
//! Once any read fails the reader is poisoned: the stream position is
//! unknown, so every later call returns `ProtocolError::Unusable`.

use crate::error::ProtocolError;
use crate::header::{ChunkHeader, Message, ResponseHeader, ResultHeader, RowRecord, SeriesHeader, Tags};
use crate::source::ByteSource;
use crate::value::{Timestamp, Value};
use crate::MAX_CONTAINER_LEN;
use chrono::DateTime;
use rmp::Marker;

/// Extension type of the standard MessagePack timestamp.
pub const EXT_TIMESTAMP: i8 = -1;

/// Extension type of the legacy 12-byte timestamp (`i64` secs, `i32` nanos).
pub const EXT_LEGACY_TIME: i8 = 5;

/// Maximum nesting depth accepted when materializing values.
pub const MAX_DEPTH: usize = 64;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Reads MessagePack primitives and result-stream headers from a source.
pub struct ChunkReader<S> {
    source: S,
    max_len: usize,
    failed: bool,
}

impl<S: ByteSource> ChunkReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            max_len: MAX_CONTAINER_LEN,
            failed: false,
        }
    }

    /// Sets the largest declared string/binary/array/map length accepted.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Returns whether a previous read failed.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        if self.failed {
            return Err(ProtocolError::Unusable);
        }
        let result = f(self);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Reads and materializes one value.
    pub fn read_value(&mut self) -> Result<Value, ProtocolError> {
        self.guard(|r| r.value(0))
    }

    /// Skips one value, including everything nested inside it, without
    /// constructing it.
    pub fn skip_value(&mut self) -> Result<(), ProtocolError> {
        self.guard(Self::skip)
    }

    /// Reads a `[remaining, partial]` chunk marker.
    pub fn read_chunk_header(&mut self) -> Result<ChunkHeader, ProtocolError> {
        self.guard(|r| {
            let len = r.array_len()?;
            if len != 2 {
                return Err(ProtocolError::InvalidChunkHeader(len));
            }
            let remaining = r.int()?;
            let remaining =
                u64::try_from(remaining).map_err(|_| ProtocolError::NegativeCount(remaining))?;
            let partial = r.bool()?;
            let header = ChunkHeader::new(remaining, !partial);
            tracing::trace!(remaining, partial, "chunk header");
            Ok(header)
        })
    }

    pub fn read_response_header(&mut self) -> Result<ResponseHeader, ProtocolError> {
        self.guard(|r| {
            let mut header = ResponseHeader::default();
            let fields = r.map_len()?;
            for _ in 0..fields {
                match r.str()?.as_str() {
                    "results" => header.result_count = r.int()?,
                    "error" => header.error = r.opt_str()?,
                    _ => r.skip()?,
                }
            }
            Ok(header)
        })
    }

    /// Reads a result header, or returns `None` if the source ended
    /// exactly at a result boundary.
    pub fn read_result_header(&mut self) -> Result<Option<ResultHeader>, ProtocolError> {
        self.guard(|r| {
            if r.source.at_end()? {
                return Ok(None);
            }
            let mut header = ResultHeader::default();
            let fields = r.map_len()?;
            for _ in 0..fields {
                match r.str()?.as_str() {
                    "id" => header.id = r.int()?,
                    "messages" => header.messages = r.messages()?,
                    "error" => header.error = r.opt_str()?,
                    _ => r.skip()?,
                }
            }
            Ok(Some(header))
        })
    }

    pub fn read_series_header(&mut self) -> Result<SeriesHeader, ProtocolError> {
        self.guard(|r| {
            let mut header = SeriesHeader::default();
            let fields = r.map_len()?;
            for _ in 0..fields {
                match r.str()?.as_str() {
                    "name" => header.name = r.opt_str()?,
                    "tags" => header.tags = r.tags()?,
                    "columns" => {
                        let n = r.nullable_array_len()?;
                        let mut columns = Vec::with_capacity(n);
                        for _ in 0..n {
                            columns.push(r.str()?);
                        }
                        header.columns = columns;
                    }
                    "error" => header.error = r.opt_str()?,
                    _ => r.skip()?,
                }
            }
            Ok(header)
        })
    }

    pub fn read_row(&mut self) -> Result<RowRecord, ProtocolError> {
        self.guard(|r| {
            let mut row = RowRecord::default();
            let fields = r.map_len()?;
            for _ in 0..fields {
                match r.str()?.as_str() {
                    "values" => {
                        let n = r.nullable_array_len()?;
                        let mut values = Vec::with_capacity(n);
                        for _ in 0..n {
                            values.push(r.value(1)?);
                        }
                        row.values = values;
                    }
                    "error" => row.error = r.opt_str()?,
                    _ => r.skip()?,
                }
            }
            Ok(row)
        })
    }

    /// Releases the underlying source.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.source.close()?;
        Ok(())
    }

    // =========================================================================
    // Raw reads
    // =========================================================================

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut buf = [0u8; N];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.bytes::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.bytes()?))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.bytes()?))
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.bytes()?))
    }

    fn check_len(&self, len: u32) -> Result<usize, ProtocolError> {
        let len = len as usize;
        if len > self.max_len {
            return Err(ProtocolError::LengthLimitExceeded {
                len,
                max: self.max_len,
            });
        }
        Ok(len)
    }

    fn buf(&mut self, len: u32) -> Result<Vec<u8>, ProtocolError> {
        let len = self.check_len(len)?;
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn marker(&mut self) -> Result<Marker, ProtocolError> {
        let byte = self.u8()?;
        match Marker::from_u8(byte) {
            Marker::Reserved => Err(ProtocolError::ReservedMarker(byte)),
            marker => Ok(marker),
        }
    }

    // =========================================================================
    // Typed reads
    // =========================================================================

    fn map_len_after(&mut self, marker: Marker) -> Result<u32, ProtocolError> {
        match marker {
            Marker::FixMap(n) => Ok(n as u32),
            Marker::Map16 => Ok(self.u16()? as u32),
            Marker::Map32 => self.u32(),
            found => Err(ProtocolError::UnexpectedMarker {
                expected: "map",
                found,
            }),
        }
    }

    fn array_len_after(&mut self, marker: Marker) -> Result<u32, ProtocolError> {
        match marker {
            Marker::FixArray(n) => Ok(n as u32),
            Marker::Array16 => Ok(self.u16()? as u32),
            Marker::Array32 => self.u32(),
            found => Err(ProtocolError::UnexpectedMarker {
                expected: "array",
                found,
            }),
        }
    }

    fn map_len(&mut self) -> Result<u32, ProtocolError> {
        let marker = self.marker()?;
        self.map_len_after(marker)
    }

    fn array_len(&mut self) -> Result<u32, ProtocolError> {
        let marker = self.marker()?;
        self.array_len_after(marker)
    }

    /// Array length where nil stands for an empty array.
    fn nullable_array_len(&mut self) -> Result<usize, ProtocolError> {
        match self.marker()? {
            Marker::Null => Ok(0),
            marker => {
                let len = self.array_len_after(marker)?;
                self.check_len(len)
            }
        }
    }

    fn str_after(&mut self, marker: Marker) -> Result<String, ProtocolError> {
        let len = match marker {
            Marker::FixStr(n) => n as u32,
            Marker::Str8 => self.u8()? as u32,
            Marker::Str16 => self.u16()? as u32,
            Marker::Str32 => self.u32()?,
            found => {
                return Err(ProtocolError::UnexpectedMarker {
                    expected: "string",
                    found,
                })
            }
        };
        let buf = self.buf(len)?;
        String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn str(&mut self) -> Result<String, ProtocolError> {
        let marker = self.marker()?;
        self.str_after(marker)
    }

    fn opt_str(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.marker()? {
            Marker::Null => Ok(None),
            marker => self.str_after(marker).map(Some),
        }
    }

    fn int_after(&mut self, marker: Marker) -> Result<i64, ProtocolError> {
        match marker {
            Marker::FixPos(n) => Ok(n as i64),
            Marker::FixNeg(n) => Ok(n as i64),
            Marker::U8 => Ok(self.u8()? as i64),
            Marker::U16 => Ok(self.u16()? as i64),
            Marker::U32 => Ok(self.u32()? as i64),
            Marker::U64 => {
                let v = self.u64()?;
                i64::try_from(v).map_err(|_| ProtocolError::IntegerOverflow(v))
            }
            Marker::I8 => Ok(self.u8()? as i8 as i64),
            Marker::I16 => Ok(self.u16()? as i16 as i64),
            Marker::I32 => Ok(self.u32()? as i32 as i64),
            Marker::I64 => Ok(self.u64()? as i64),
            found => Err(ProtocolError::UnexpectedMarker {
                expected: "integer",
                found,
            }),
        }
    }

    fn int(&mut self) -> Result<i64, ProtocolError> {
        let marker = self.marker()?;
        self.int_after(marker)
    }

    fn bool(&mut self) -> Result<bool, ProtocolError> {
        match self.marker()? {
            Marker::True => Ok(true),
            Marker::False => Ok(false),
            found => Err(ProtocolError::UnexpectedMarker {
                expected: "bool",
                found,
            }),
        }
    }

    fn tags(&mut self) -> Result<Tags, ProtocolError> {
        let mut tags = Tags::new();
        let len = match self.marker()? {
            Marker::Null => return Ok(tags),
            marker => self.map_len_after(marker)?,
        };
        for _ in 0..len {
            let key = self.str()?;
            let value = self.str()?;
            tags.insert(key, value);
        }
        Ok(tags)
    }

    fn messages(&mut self) -> Result<Vec<Message>, ProtocolError> {
        let n = self.nullable_array_len()?;
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            let mut message = Message::default();
            let fields = self.map_len()?;
            for _ in 0..fields {
                match self.str()?.as_str() {
                    "level" => message.level = self.opt_str()?.unwrap_or_default(),
                    "text" => message.text = self.opt_str()?.unwrap_or_default(),
                    _ => self.skip()?,
                }
            }
            messages.push(message);
        }
        Ok(messages)
    }

    // =========================================================================
    // Dynamic values
    // =========================================================================

    fn value(&mut self, depth: usize) -> Result<Value, ProtocolError> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
        }
        let marker = self.marker()?;
        let value = match marker {
            Marker::Null => Value::Nil,
            Marker::True => Value::Bool(true),
            Marker::False => Value::Bool(false),
            Marker::U64 => Value::from(self.u64()?),
            Marker::FixPos(_)
            | Marker::FixNeg(_)
            | Marker::U8
            | Marker::U16
            | Marker::U32
            | Marker::I8
            | Marker::I16
            | Marker::I32
            | Marker::I64 => Value::Int(self.int_after(marker)?),
            Marker::F32 => Value::Float(f32::from_bits(self.u32()?) as f64),
            Marker::F64 => Value::Float(f64::from_bits(self.u64()?)),
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                Value::String(self.str_after(marker)?)
            }
            Marker::Bin8 => {
                let len = self.u8()? as u32;
                Value::Binary(self.buf(len)?)
            }
            Marker::Bin16 => {
                let len = self.u16()? as u32;
                Value::Binary(self.buf(len)?)
            }
            Marker::Bin32 => {
                let len = self.u32()?;
                Value::Binary(self.buf(len)?)
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = self.array_len_after(marker)?;
                let len = self.check_len(len)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.value(depth + 1)?);
                }
                Value::Array(items)
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len = self.map_len_after(marker)?;
                let len = self.check_len(len)?;
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.value(depth + 1)?;
                    let value = self.value(depth + 1)?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
            Marker::FixExt1 => self.ext(1)?,
            Marker::FixExt2 => self.ext(2)?,
            Marker::FixExt4 => self.ext(4)?,
            Marker::FixExt8 => self.ext(8)?,
            Marker::FixExt16 => self.ext(16)?,
            Marker::Ext8 => {
                let len = self.u8()? as u32;
                self.ext(len)?
            }
            Marker::Ext16 => {
                let len = self.u16()? as u32;
                self.ext(len)?
            }
            Marker::Ext32 => {
                let len = self.u32()?;
                self.ext(len)?
            }
            Marker::Reserved => return Err(ProtocolError::ReservedMarker(0xc1)),
        };
        Ok(value)
    }

    fn ext(&mut self, len: u32) -> Result<Value, ProtocolError> {
        let tag = self.u8()? as i8;
        let data = self.buf(len)?;
        match tag {
            EXT_TIMESTAMP | EXT_LEGACY_TIME => decode_timestamp(tag, &data).map(Value::Timestamp),
            _ => Ok(Value::Ext(tag, data)),
        }
    }

    /// Skips one value iteratively so that deep nesting cannot exhaust the
    /// stack.
    fn skip(&mut self) -> Result<(), ProtocolError> {
        let mut pending: u64 = 1;
        while pending > 0 {
            pending -= 1;
            let payload: u64 = match self.marker()? {
                Marker::FixPos(_)
                | Marker::FixNeg(_)
                | Marker::Null
                | Marker::True
                | Marker::False => 0,
                Marker::U8 | Marker::I8 => 1,
                Marker::U16 | Marker::I16 => 2,
                Marker::U32 | Marker::I32 | Marker::F32 => 4,
                Marker::U64 | Marker::I64 | Marker::F64 => 8,
                Marker::FixStr(n) => n as u64,
                Marker::Str8 | Marker::Bin8 => self.u8()? as u64,
                Marker::Str16 | Marker::Bin16 => self.u16()? as u64,
                Marker::Str32 | Marker::Bin32 => self.u32()? as u64,
                Marker::FixArray(n) => {
                    pending += n as u64;
                    0
                }
                Marker::Array16 => {
                    pending += self.u16()? as u64;
                    0
                }
                Marker::Array32 => {
                    pending += self.u32()? as u64;
                    0
                }
                Marker::FixMap(n) => {
                    pending += 2 * n as u64;
                    0
                }
                Marker::Map16 => {
                    pending += 2 * self.u16()? as u64;
                    0
                }
                Marker::Map32 => {
                    pending += 2 * self.u32()? as u64;
                    0
                }
                Marker::FixExt1 => 2,
                Marker::FixExt2 => 3,
                Marker::FixExt4 => 5,
                Marker::FixExt8 => 9,
                Marker::FixExt16 => 17,
                Marker::Ext8 => self.u8()? as u64 + 1,
                Marker::Ext16 => self.u16()? as u64 + 1,
                Marker::Ext32 => self.u32()? as u64 + 1,
                Marker::Reserved => return Err(ProtocolError::ReservedMarker(0xc1)),
            };
            if payload > 0 {
                self.source.skip(payload)?;
            }
        }
        Ok(())
    }
}

fn decode_timestamp(tag: i8, data: &[u8]) -> Result<Timestamp, ProtocolError> {
    let invalid = || ProtocolError::InvalidTimestamp { len: data.len() };
    let (secs, nanos) = match (tag, data.len()) {
        (EXT_TIMESTAMP, 4) => {
            let secs = u32::from_be_bytes(data.try_into().map_err(|_| invalid())?);
            (secs as i64, 0u32)
        }
        (EXT_TIMESTAMP, 8) => {
            let raw = u64::from_be_bytes(data.try_into().map_err(|_| invalid())?);
            ((raw & 0x3_ffff_ffff) as i64, (raw >> 34) as u32)
        }
        (EXT_TIMESTAMP, 12) => {
            let nanos = u32::from_be_bytes(data[..4].try_into().map_err(|_| invalid())?);
            let secs = i64::from_be_bytes(data[4..].try_into().map_err(|_| invalid())?);
            (secs, nanos)
        }
        (EXT_LEGACY_TIME, 12) => {
            let secs = i64::from_be_bytes(data[..8].try_into().map_err(|_| invalid())?);
            let nanos = i32::from_be_bytes(data[8..].try_into().map_err(|_| invalid())?);
            let nanos = u32::try_from(nanos).map_err(|_| invalid())?;
            (secs, nanos)
        }
        _ => return Err(invalid()),
    };
    if nanos >= NANOS_PER_SEC {
        return Err(invalid());
    }
    DateTime::from_timestamp(secs, nanos).ok_or_else(invalid)
}
