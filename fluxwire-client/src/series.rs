//! Series decoding.
//!
//! A series header is followed by its own chain of row chunks. Rows are
//! decoded lazily by `next_row`; `discard` skips whatever is left without
//! building any values.

use crate::chunk::ChunkState;
use crate::error::{CursorError, ErrorLevel};
use crate::row::Row;
use fluxwire_protocol::{ChunkHeader, FrameDecoder, SeriesHeader, Tags};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Decoding state of the series currently open inside a result.
#[derive(Debug)]
pub(crate) struct SeriesState {
    name: String,
    tags: Tags,
    columns: Arc<[String]>,
    rows: ChunkState,
    /// Error from an eager chunk-header read, reported on the next call.
    pending: Option<CursorError>,
    /// No more rows will be decoded.
    finished: bool,
    prefetch: bool,
}

impl SeriesState {
    pub fn new(header: SeriesHeader, rows: ChunkHeader, prefetch: bool) -> Self {
        Self {
            name: header.name.unwrap_or_default(),
            tags: header.tags,
            columns: header.columns.into(),
            rows: ChunkState::primed(rows),
            pending: None,
            finished: false,
            prefetch,
        }
    }

    pub fn next_row(&mut self, decoder: &mut dyn FrameDecoder) -> Result<Option<Row>, CursorError> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        if self.finished || !self.rows.ready(decoder)? {
            return Ok(None);
        }

        let record = decoder.read_row()?;
        self.rows.consume();

        if let Some(message) = record.error {
            return Err(CursorError::server(ErrorLevel::Row, message));
        }

        // Read ahead so length() reflects the next chunk. A failure here
        // must not cost the caller the row already decoded.
        if self.prefetch && self.rows.needs_header() {
            match decoder.read_chunk_header() {
                Ok(header) => self.rows.absorb(header),
                Err(err) => {
                    tracing::warn!(series = %self.name, "deferring chunk header error: {}", err);
                    self.pending = Some(err.into());
                    self.finished = true;
                }
            }
        }

        Ok(Some(Row::new(record.values, self.columns.clone())))
    }

    /// Skips every row not yet returned. Safe to call repeatedly.
    pub fn discard(&mut self, decoder: &mut dyn FrameDecoder) -> Result<(), CursorError> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        if self.finished {
            return Ok(());
        }

        let mut skipped = 0u64;
        loop {
            while self.rows.remaining > 0 {
                decoder.skip_row()?;
                self.rows.consume();
                skipped += 1;
            }
            if self.rows.complete {
                break;
            }
            let header = decoder.read_chunk_header()?;
            self.rows.absorb(header);
        }
        self.finished = true;

        if skipped > 0 {
            tracing::debug!(series = %self.name, skipped, "discarded unread rows");
        }
        Ok(())
    }

    pub fn length(&self) -> (u64, bool) {
        (self.rows.known, self.rows.complete)
    }
}

/// A series inside a result.
///
/// Borrows its `ResultSet` mutably, so the next series cannot be requested
/// while this handle is alive. Iteration is forward only.
pub struct Series<'r> {
    decoder: &'r mut dyn FrameDecoder,
    state: &'r mut SeriesState,
}

impl<'r> Series<'r> {
    pub(crate) fn new(decoder: &'r mut dyn FrameDecoder, state: &'r mut SeriesState) -> Self {
        Self { decoder, state }
    }

    /// Measurement name, empty if the server sent none.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn tags(&self) -> &Tags {
        &self.state.tags
    }

    pub fn columns(&self) -> &[String] {
        &self.state.columns
    }

    /// Number of rows known so far across all chunks, and whether that is
    /// the final count.
    pub fn length(&self) -> (u64, bool) {
        self.state.length()
    }

    /// Decodes the next row, or returns `None` at the end of the series.
    pub fn next_row(&mut self) -> Result<Option<Row>, CursorError> {
        self.state.next_row(&mut *self.decoder)
    }

    /// Skips every remaining row. Later calls to `next_row` return `None`.
    pub fn discard(&mut self) -> Result<(), CursorError> {
        self.state.discard(&mut *self.decoder)
    }

    /// Calls `f` for every remaining row. `ControlFlow::Break` stops early
    /// without an error; the unread rows are skipped by the next sibling
    /// request or by `Cursor::close`.
    pub fn for_each_row<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(Row) -> Result<ControlFlow<()>, E>,
        E: From<CursorError>,
    {
        while let Some(row) = self.next_row()? {
            if f(row)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

impl Iterator for Series<'_> {
    type Item = Result<Row, CursorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
