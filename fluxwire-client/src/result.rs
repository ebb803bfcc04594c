//! Result decoding.

use crate::chunk::ChunkState;
use crate::error::{CursorError, ErrorLevel};
use crate::series::{Series, SeriesState};
use fluxwire_protocol::{ChunkHeader, FrameDecoder, Message, ResultHeader};
use std::ops::ControlFlow;

/// Decoding state of the result currently open on a cursor.
#[derive(Debug)]
pub(crate) struct ResultState {
    id: i64,
    messages: Vec<Message>,
    series: ChunkState,
    active: Option<SeriesState>,
    finished: bool,
    prefetch: bool,
}

impl ResultState {
    pub fn new(header: ResultHeader, series: ChunkHeader, prefetch: bool) -> Self {
        Self {
            id: header.id,
            messages: header.messages,
            series: ChunkState::primed(series),
            active: None,
            finished: false,
            prefetch,
        }
    }

    pub fn next_series<'a>(
        &'a mut self,
        decoder: &'a mut dyn FrameDecoder,
    ) -> Result<Option<Series<'a>>, CursorError> {
        if let Some(mut previous) = self.active.take() {
            previous.discard(decoder)?;
        }
        if self.finished {
            return Ok(None);
        }
        if !self.series.ready(decoder)? {
            self.finished = true;
            return Ok(None);
        }

        let header = decoder.read_series_header()?;
        self.series.consume();

        // An errored series carries no row chunks.
        if let Some(message) = header.error {
            return Err(CursorError::server(ErrorLevel::Series, message));
        }

        let rows = decoder.read_chunk_header()?;
        tracing::debug!(
            result = self.id,
            name = header.name.as_deref().unwrap_or(""),
            rows = rows.remaining,
            "series"
        );
        let state = self.active.insert(SeriesState::new(header, rows, self.prefetch));
        Ok(Some(Series::new(decoder, state)))
    }

    /// Skips every series not yet fully read. Inline series errors are
    /// dropped along with the series that carried them.
    pub fn discard(&mut self, decoder: &mut dyn FrameDecoder) -> Result<(), CursorError> {
        loop {
            match self.next_series(decoder) {
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(()),
                Err(CursorError::Server { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

/// One result of a response.
///
/// Borrows its `Cursor` mutably; requesting the next result discards
/// whatever this one has left.
pub struct ResultSet<'c> {
    decoder: &'c mut dyn FrameDecoder,
    state: &'c mut ResultState,
}

impl<'c> ResultSet<'c> {
    pub(crate) fn new(decoder: &'c mut dyn FrameDecoder, state: &'c mut ResultState) -> Self {
        Self { decoder, state }
    }

    /// Statement id assigned by the server.
    pub fn id(&self) -> i64 {
        self.state.id
    }

    /// Informational messages attached to the result.
    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    /// Advances to the next series, discarding the unread part of the
    /// previous one. Returns `None` once every series has been read.
    ///
    /// A series-level server error is returned as `CursorError::Server`;
    /// the result stays usable and the next call moves on.
    pub fn next_series(&mut self) -> Result<Option<Series<'_>>, CursorError> {
        self.state.next_series(&mut *self.decoder)
    }

    /// Skips every remaining series and row.
    pub fn discard(&mut self) -> Result<(), CursorError> {
        self.state.discard(&mut *self.decoder)
    }

    /// Calls `f` for every remaining series. Errors, including inline
    /// series errors, stop the walk and are returned.
    pub fn for_each_series<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(Series<'_>) -> Result<ControlFlow<()>, E>,
        E: From<CursorError>,
    {
        while let Some(series) = self.next_series()? {
            if f(series)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}
