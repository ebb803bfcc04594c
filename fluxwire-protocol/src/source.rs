//! Byte sources feeding the decoder.
//!
//! The decoder only needs four things from its transport: read exactly N
//! bytes, skip N bytes, tell whether the stream ended cleanly, and release
//! the underlying connection once. HTTP, buffering policy and timeouts all
//! live on the other side of this trait.

use bytes::{Buf, Bytes};
use std::io::{self, BufRead, BufReader, Read};

/// Byte-oriented input consumed by a `ChunkReader`.
pub trait ByteSource {
    /// Fills `buf` completely or fails with `UnexpectedEof`.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Discards exactly `n` bytes or fails with `UnexpectedEof`.
    fn skip(&mut self, n: u64) -> io::Result<()>;

    /// Returns `true` if no more bytes will ever be produced.
    fn at_end(&mut self) -> io::Result<bool>;

    /// Releases the underlying transport. Called once by the cursor.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        (**self).skip(n)
    }

    fn at_end(&mut self) -> io::Result<bool> {
        (**self).at_end()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "byte source closed")
}

/// Adapts any `std::io::Read` (an HTTP body, a file, a socket) into a
/// `ByteSource`. Closing drops the reader.
pub struct ReaderSource<R> {
    inner: Option<BufReader<R>>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Some(BufReader::new(reader)),
        }
    }

    /// Wraps `reader` with a buffer of `capacity` bytes. A zero capacity is
    /// raised to one: `at_end` needs a buffer that can hold a byte.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            inner: Some(BufReader::with_capacity(capacity.max(1), reader)),
        }
    }

    /// Returns whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn reader(&mut self) -> io::Result<&mut BufReader<R>> {
        self.inner.as_mut().ok_or_else(closed_error)
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.reader()?.read_exact(buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let reader = self.reader()?;
        let copied = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
        if copied < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("skip: needed {} more bytes", n - copied),
            ));
        }
        Ok(())
    }

    fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.reader()?.fill_buf()?.is_empty())
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner = None;
        Ok(())
    }
}

/// An in-memory source over a `Bytes` buffer.
#[derive(Debug, Clone, Default)]
pub struct BytesSource {
    buf: Bytes,
    closed: bool,
}

impl BytesSource {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            closed: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure(&self, n: usize) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        if self.buf.remaining() < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("need {} more bytes", n - self.buf.remaining()),
            ));
        }
        Ok(())
    }
}

impl ByteSource for BytesSource {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.ensure(buf.len())?;
        self.buf.copy_to_slice(buf);
        Ok(())
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let n = usize::try_from(n).map_err(|_| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }

    fn at_end(&mut self) -> io::Result<bool> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(!self.buf.has_remaining())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.buf.clear();
        Ok(())
    }
}
