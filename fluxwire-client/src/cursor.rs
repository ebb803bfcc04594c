//! Top-level cursor over a response stream.

use crate::config::{DecoderConfig, MAX_READ_BUFFER_SIZE, MIN_READ_BUFFER_SIZE};
use crate::error::{CursorError, ErrorLevel};
use crate::result::{ResultSet, ResultState};
use fluxwire_protocol::{ByteSource, Decoder, Format, FrameDecoder, ReaderSource};
use std::io::Read;
use std::ops::ControlFlow;

/// Pull-based reader of one response.
///
/// The cursor owns the byte source. Results, series and rows are handed
/// out as borrowing handles, so iteration is forward only and strictly
/// sequential: a sibling can only be requested once the previous handle
/// is gone, and whatever that handle left unread is discarded first.
/// There is no way to rewind.
pub struct Cursor<S> {
    decoder: Decoder<S>,
    result_count: i64,
    active: Option<ResultState>,
    closed: bool,
    prefetch: bool,
}

impl<S: ByteSource> Cursor<S> {
    /// Opens a cursor for the format named by `format` (short name or MIME
    /// type) with the default configuration.
    pub fn open(source: S, format: &str) -> Result<Self, CursorError> {
        Self::open_with_config(source, format, DecoderConfig::default())
    }

    pub fn open_with_config(
        source: S,
        format: &str,
        config: DecoderConfig,
    ) -> Result<Self, CursorError> {
        let format: Format = format.parse()?;
        Self::with_format(source, format, config)
    }

    /// Reads the response header.
    ///
    /// If the header is malformed or carries an error, the source is
    /// released before the error is returned.
    pub fn with_format(
        source: S,
        format: Format,
        config: DecoderConfig,
    ) -> Result<Self, CursorError> {
        let mut decoder = Decoder::new(source, format).with_max_len(config.max_container_len);

        let header = match decoder.read_response_header() {
            Ok(header) => header,
            Err(err) => {
                let _ = decoder.close();
                return Err(err.into());
            }
        };
        if let Some(message) = header.error {
            let _ = decoder.close();
            return Err(CursorError::server(ErrorLevel::Response, message));
        }

        tracing::debug!(%format, results = header.result_count, "cursor opened");
        Ok(Self {
            decoder,
            result_count: header.result_count,
            active: None,
            closed: false,
            prefetch: config.prefetch_chunk_headers,
        })
    }

    pub fn format(&self) -> Format {
        self.decoder.format()
    }

    /// Number of results announced by the response header.
    pub fn result_count(&self) -> i64 {
        self.result_count
    }

    pub fn get_ref(&self) -> &S {
        self.decoder.get_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advances to the next result, discarding whatever the previous one
    /// left unread. Returns `None` when the stream ends at a result
    /// boundary.
    ///
    /// A result-level server error is returned as `CursorError::Server`;
    /// the cursor stays usable and the next call moves on.
    pub fn next_result(&mut self) -> Result<Option<ResultSet<'_>>, CursorError> {
        if self.closed {
            return Err(CursorError::Closed);
        }
        if let Some(mut previous) = self.active.take() {
            tracing::debug!(result = previous.id(), "discarding result");
            previous.discard(&mut self.decoder)?;
        }

        let header = match self.decoder.read_result_header()? {
            Some(header) => header,
            None => return Ok(None),
        };

        // An errored result carries no series chunks.
        if let Some(message) = header.error {
            return Err(CursorError::server(ErrorLevel::Result, message));
        }

        let series = self.decoder.read_chunk_header()?;
        let state = self
            .active
            .insert(ResultState::new(header, series, self.prefetch));
        Ok(Some(ResultSet::new(&mut self.decoder, state)))
    }

    /// Calls `f` for every remaining result. `ControlFlow::Break` ends the
    /// walk without an error; any error from `f` or from decoding is
    /// returned.
    pub fn for_each_result<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(ResultSet<'_>) -> Result<ControlFlow<()>, E>,
        E: From<CursorError>,
    {
        while let Some(result) = self.next_result()? {
            if f(result)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Discards any open result and releases the byte source. Calling it
    /// again is a no-op.
    ///
    /// The source is released even when the discard fails; the discard
    /// error is reported first.
    pub fn close(&mut self) -> Result<(), CursorError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let discarded = match self.active.take() {
            Some(mut state) => state.discard(&mut self.decoder),
            None => Ok(()),
        };
        let released = self.decoder.close();
        tracing::debug!(results = self.result_count, "cursor closed");

        discarded?;
        released?;
        Ok(())
    }
}

impl<R: Read> Cursor<ReaderSource<R>> {
    /// Opens a cursor over any reader, buffered with
    /// `config.read_buffer_size` clamped to the supported range.
    pub fn from_reader(reader: R, format: Format, config: DecoderConfig) -> Result<Self, CursorError> {
        let capacity = config
            .read_buffer_size
            .clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        let source = ReaderSource::with_capacity(capacity, reader);
        Self::with_format(source, format, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxwire_protocol::{BytesSource, Encoder, Message, ProtocolError, Tags, Value};
    use proptest::prelude::*;

    fn open(enc: Encoder) -> Cursor<BytesSource> {
        Cursor::open(BytesSource::new(enc.finish()), "msgpack").unwrap()
    }

    /// Writes a series whose rows are split into chunks of the given sizes.
    fn write_series(enc: &mut Encoder, name: &str, chunks: &[usize]) {
        enc.series_header(Some(name), &Tags::new(), &["time", "n"], None)
            .unwrap();
        if chunks.is_empty() {
            enc.chunk_header(0, false).unwrap();
        }
        let mut n = 0i64;
        for (i, size) in chunks.iter().enumerate() {
            let partial = i + 1 < chunks.len();
            enc.chunk_header(*size as u64, partial).unwrap();
            for _ in 0..*size {
                enc.row(&[Value::Int(n), Value::Int(n)], None).unwrap();
                n += 1;
            }
        }
    }

    fn write_result(enc: &mut Encoder, id: i64, series: &[Vec<usize>]) {
        enc.result_header(id, None)
            .unwrap()
            .chunk_header(series.len() as u64, false)
            .unwrap();
        for (i, chunks) in series.iter().enumerate() {
            write_series(enc, &format!("s{}", i), chunks);
        }
    }

    const SENTINEL_ID: i64 = 9999;

    fn stream(results: &[Vec<Vec<usize>>]) -> Encoder {
        let mut enc = Encoder::new();
        enc.response_header(results.len() as i64 + 1, None).unwrap();
        for (id, series) in results.iter().enumerate() {
            write_result(&mut enc, id as i64, series);
        }
        write_result(&mut enc, SENTINEL_ID, &[vec![1]]);
        enc
    }

    #[test]
    fn test_single_row_scenario() {
        let mut enc = Encoder::new();
        enc.response_header(1, None)
            .unwrap()
            .result_header(0, None)
            .unwrap()
            .chunk_header(1, false)
            .unwrap()
            .series_header(Some("cpu"), &Tags::new(), &["time", "value"], None)
            .unwrap()
            .chunk_header(1, false)
            .unwrap()
            .row(&[Value::Int(1000), Value::Float(5.0)], None)
            .unwrap();
        let mut cursor = open(enc);
        assert_eq!(cursor.result_count(), 1);
        assert_eq!(cursor.format(), Format::MessagePack);

        {
            let mut result = cursor.next_result().unwrap().unwrap();
            assert_eq!(result.id(), 0);
            {
                let mut series = result.next_series().unwrap().unwrap();
                assert_eq!(series.name(), "cpu");
                assert!(series.tags().is_empty());

                let row = series.next_row().unwrap().unwrap();
                assert_eq!(row.value_by_name("value"), Some(&Value::Float(5.0)));
                assert_eq!(row.time().timestamp_nanos_opt(), Some(1000));

                assert!(series.next_row().unwrap().is_none());
                assert_eq!(series.length(), (1, true));
            }
            assert!(result.next_series().unwrap().is_none());
        }
        assert!(cursor.next_result().unwrap().is_none());
        cursor.close().unwrap();
        assert!(cursor.get_ref().is_closed());
    }

    #[test]
    fn test_response_error() {
        let mut enc = Encoder::new();
        enc.error_header("no database found").unwrap();
        let err = Cursor::open(BytesSource::new(enc.finish()), "msgpack")
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "no database found");
        assert_eq!(err.level(), Some(ErrorLevel::Response));
    }

    #[test]
    fn test_malformed_response_header() {
        let mut enc = Encoder::new();
        enc.chunk_header(1, false).unwrap();
        let err = Cursor::open(BytesSource::new(enc.finish()), "msgpack")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CursorError::Protocol(ProtocolError::UnexpectedMarker { .. })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_stream_is_transport_error() {
        let err = Cursor::open(BytesSource::new(Vec::new()), "msgpack")
            .err()
            .unwrap();
        assert!(matches!(err, CursorError::Transport(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let err = Cursor::open(BytesSource::new(Vec::new()), "application/json")
            .err()
            .unwrap();
        match err {
            CursorError::UnsupportedFormat { format } => assert_eq!(format, "application/json"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_mime_type_selects_msgpack() {
        let enc = stream(&[]);
        let cursor = Cursor::open(BytesSource::new(enc.finish()), "application/x-msgpack").unwrap();
        assert_eq!(cursor.format(), Format::MessagePack);
    }

    #[test]
    fn test_result_error_does_not_stop_cursor() {
        let mut enc = Encoder::new();
        enc.response_header(2, None).unwrap();
        enc.error_header("expected err").unwrap();
        write_result(&mut enc, 1, &[vec![2]]);
        let mut cursor = open(enc);

        let err = cursor.next_result().err().unwrap();
        assert_eq!(err.server_message(), Some("expected err"));
        assert_eq!(err.level(), Some(ErrorLevel::Result));

        let result = cursor.next_result().unwrap().unwrap();
        assert_eq!(result.id(), 1);
        assert!(cursor.next_result().unwrap().is_none());
    }

    #[test]
    fn test_series_error_then_next_result() {
        let mut enc = Encoder::new();
        enc.response_header(2, None).unwrap();
        enc.result_header(0, None)
            .unwrap()
            .chunk_header(2, false)
            .unwrap()
            .error_header("expected err")
            .unwrap();
        write_series(&mut enc, "cpu", &[3]);
        write_result(&mut enc, 1, &[vec![1]]);
        let mut cursor = open(enc);

        {
            let mut result = cursor.next_result().unwrap().unwrap();
            let err = result.next_series().err().unwrap();
            assert_eq!(err.to_string(), "expected err");
            assert!(!err.is_fatal());
        }

        let mut result = cursor.next_result().unwrap().unwrap();
        assert_eq!(result.id(), 1);
        let mut series = result.next_series().unwrap().unwrap();
        assert_eq!(series.next_row().unwrap().unwrap().value(1), &Value::Int(0));
    }

    #[test]
    fn test_result_messages() {
        let mut enc = Encoder::new();
        enc.response_header(1, None).unwrap();
        let messages = vec![Message {
            level: "warning".to_string(),
            text: "deprecated syntax".to_string(),
        }];
        enc.result_header_with_messages(4, &messages, None)
            .unwrap()
            .chunk_header(0, false)
            .unwrap();
        let mut cursor = open(enc);

        let mut result = cursor.next_result().unwrap().unwrap();
        assert_eq!(result.messages(), messages.as_slice());
        assert!(result.next_series().unwrap().is_none());
    }

    #[test]
    fn test_length_tracks_chunks() {
        let mut cursor = open(stream(&[vec![vec![2, 3]]]));
        let mut result = cursor.next_result().unwrap().unwrap();
        let mut series = result.next_series().unwrap().unwrap();

        assert_eq!(series.length(), (2, false));
        series.next_row().unwrap().unwrap();
        assert_eq!(series.length(), (2, false));
        series.next_row().unwrap().unwrap();
        assert_eq!(series.length(), (5, true));

        let rest: Vec<_> = series.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(series.length(), (5, true));
    }

    #[test]
    fn test_length_without_prefetch() {
        let config = DecoderConfig::new().with_prefetch_chunk_headers(false);
        let enc = stream(&[vec![vec![1, 1]]]);
        let mut cursor =
            Cursor::with_format(BytesSource::new(enc.finish()), Format::MessagePack, config).unwrap();
        let mut result = cursor.next_result().unwrap().unwrap();
        let mut series = result.next_series().unwrap().unwrap();

        series.next_row().unwrap().unwrap();
        assert_eq!(series.length(), (1, false));
        series.next_row().unwrap().unwrap();
        assert_eq!(series.length(), (2, true));
    }

    #[test]
    fn test_partial_discard_reaches_next_result() {
        let mut cursor = open(stream(&[vec![vec![3, 2], vec![4]], vec![vec![1]]]));
        {
            let mut result = cursor.next_result().unwrap().unwrap();
            let mut series = result.next_series().unwrap().unwrap();
            series.next_row().unwrap().unwrap();
        }
        {
            let result = cursor.next_result().unwrap().unwrap();
            assert_eq!(result.id(), 1);
        }
        let mut result = cursor.next_result().unwrap().unwrap();
        assert_eq!(result.id(), SENTINEL_ID);
        let mut series = result.next_series().unwrap().unwrap();
        assert!(series.next_row().unwrap().is_some());
    }

    #[test]
    fn test_stop_then_close() {
        let mut cursor = open(stream(&[vec![vec![5]], vec![vec![5]]]));
        let mut rows = 0;
        cursor
            .for_each_result(|mut result| {
                result.for_each_series(|mut series| {
                    series.for_each_row(|_row| {
                        rows += 1;
                        Ok::<_, CursorError>(ControlFlow::Break(()))
                    })?;
                    Ok::<_, CursorError>(ControlFlow::Continue(()))
                })?;
                Ok::<_, CursorError>(ControlFlow::Break(()))
            })
            .unwrap();
        assert_eq!(rows, 1);

        cursor.close().unwrap();
        assert!(cursor.get_ref().is_closed());
        cursor.close().unwrap();
        assert!(matches!(cursor.next_result().err(), Some(CursorError::Closed)));
    }

    #[test]
    fn test_callback_error_surfaces() {
        #[derive(Debug)]
        enum RenderError {
            Cursor(CursorError),
            Full,
        }
        impl From<CursorError> for RenderError {
            fn from(err: CursorError) -> Self {
                RenderError::Cursor(err)
            }
        }

        let mut cursor = open(stream(&[vec![vec![1]]]));
        let err = cursor
            .for_each_result(|_| Err::<ControlFlow<()>, _>(RenderError::Full))
            .unwrap_err();
        assert!(matches!(err, RenderError::Full));
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let mut enc = Encoder::new();
        enc.response_header(1, None).unwrap();
        enc.result_header(0, None)
            .unwrap()
            .chunk_header(1, false)
            .unwrap();
        enc.series_header(Some("cpu"), &Tags::new(), &["n"], None)
            .unwrap()
            .chunk_header(2, false)
            .unwrap()
            .row(&[Value::Int(1)], None)
            .unwrap();
        let mut cursor = open(enc);

        {
            let mut result = cursor.next_result().unwrap().unwrap();
            let mut series = result.next_series().unwrap().unwrap();
            series.next_row().unwrap().unwrap();
            let err = series.next_row().unwrap_err();
            assert!(matches!(err, CursorError::Transport(_)));
        }

        let err = cursor.next_result().err().unwrap();
        assert!(err.is_fatal());
        cursor.close().unwrap();
        assert!(cursor.get_ref().is_closed());
    }

    #[test]
    fn test_from_reader() {
        let bytes = stream(&[vec![vec![2]]]).finish().to_vec();
        let mut cursor = Cursor::from_reader(
            std::io::Cursor::new(bytes),
            Format::MessagePack,
            DecoderConfig::default(),
        )
        .unwrap();

        let mut result = cursor.next_result().unwrap().unwrap();
        let series = result.next_series().unwrap().unwrap();
        assert_eq!(series.count(), 2);
        cursor.close().unwrap();
        assert!(cursor.get_ref().is_closed());
    }

    #[test]
    fn test_from_reader_zero_buffer_size_reads_results() {
        let config: DecoderConfig = serde_json::from_str(r#"{"read_buffer_size": 0}"#).unwrap();
        assert_eq!(config.read_buffer_size, 0);

        let bytes = stream(&[vec![vec![1]]]).finish().to_vec();
        let mut cursor =
            Cursor::from_reader(std::io::Cursor::new(bytes), Format::MessagePack, config).unwrap();

        let mut ids = Vec::new();
        while let Some(result) = cursor.next_result().unwrap() {
            ids.push(result.id());
        }
        assert_eq!(ids, vec![0, SENTINEL_ID]);
    }

    #[test]
    fn test_close_releases_source_when_discard_fails() {
        let mut enc = Encoder::new();
        enc.response_header(1, None).unwrap();
        enc.result_header(0, None)
            .unwrap()
            .chunk_header(1, false)
            .unwrap();
        enc.series_header(Some("cpu"), &Tags::new(), &["n"], None)
            .unwrap()
            .chunk_header(3, false)
            .unwrap()
            .row(&[Value::Int(1)], None)
            .unwrap();
        let mut cursor = open(enc);

        {
            let mut result = cursor.next_result().unwrap().unwrap();
            let mut series = result.next_series().unwrap().unwrap();
            series.next_row().unwrap().unwrap();
        }

        let err = cursor.close().unwrap_err();
        assert!(matches!(err, CursorError::Transport(_)));
        assert!(cursor.get_ref().is_closed());
        assert!(cursor.is_closed());
        cursor.close().unwrap();
    }

    fn results_strategy() -> impl Strategy<Value = Vec<Vec<Vec<usize>>>> {
        prop::collection::vec(
            prop::collection::vec(prop::collection::vec(0usize..4, 0..4), 0..4),
            0..4,
        )
    }

    proptest! {
        #[test]
        fn prop_rows_equal_sum_of_chunks(results in results_strategy()) {
            let mut cursor = open(stream(&results));
            let mut index = 0;
            while let Some(mut result) = cursor.next_result().unwrap() {
                if result.id() == SENTINEL_ID {
                    break;
                }
                let expected = &results[index];
                let mut s = 0;
                while let Some(mut series) = result.next_series().unwrap() {
                    let mut rows = 0u64;
                    while let Some(row) = series.next_row().unwrap() {
                        prop_assert_eq!(row.value(1), &Value::Int(rows as i64));
                        rows += 1;
                    }
                    let total: usize = expected[s].iter().sum();
                    prop_assert_eq!(rows, total as u64);
                    prop_assert_eq!(series.length(), (total as u64, true));
                    s += 1;
                }
                prop_assert_eq!(s, expected.len());
                index += 1;
            }
            prop_assert_eq!(index, results.len());
        }

        #[test]
        fn prop_partial_discard_keeps_position(
            results in results_strategy(),
            series_to_read in 0usize..3,
            rows_to_read in 0usize..5,
        ) {
            let mut cursor = open(stream(&results));
            for id in 0..results.len() {
                let mut result = cursor.next_result().unwrap().unwrap();
                prop_assert_eq!(result.id(), id as i64);
                for _ in 0..series_to_read {
                    match result.next_series().unwrap() {
                        Some(mut series) => {
                            for _ in 0..rows_to_read {
                                if series.next_row().unwrap().is_none() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    }
                }
            }

            let mut tail = cursor.next_result().unwrap().unwrap();
            prop_assert_eq!(tail.id(), SENTINEL_ID);
            let mut series = tail.next_series().unwrap().unwrap();
            let row = series.next_row().unwrap().unwrap();
            prop_assert_eq!(row.value(1), &Value::Int(0));
            drop(series);
            drop(tail);
            prop_assert!(cursor.next_result().unwrap().is_none());
        }
    }
}
