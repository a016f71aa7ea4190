use std::fs::File;
use std::io::Read;
use std::path::Path;

use memchr::memchr_iter;

use crate::buffer::ByteBuffer;
use crate::error::{self, Error, ErrorKind};
use crate::records::{ByteRecord, Row};
use crate::scanner::{lowest_set_bit, valid_bits, MaskIter, Scanner, SCAN_WIDTH};
use crate::source::{BufferConfig, Compression, InputBuffer};

/// Builds a [`RowParser`] with given configuration.
#[derive(Clone)]
pub struct RowParserBuilder {
    max_columns: usize,
    max_row_len: usize,
    buffer_capacity: usize,
    raw_capacity: usize,
    compression: Compression,
    scalar: bool,
    verify_checksum: bool,
}

impl Default for RowParserBuilder {
    fn default() -> Self {
        Self {
            max_columns: 500,
            max_row_len: 32 * (1 << 10),
            buffer_capacity: 1 << 20,
            raw_capacity: 64 * (1 << 10),
            compression: Compression::Auto,
            scalar: false,
            verify_checksum: true,
        }
    }
}

impl RowParserBuilder {
    /// Create a new [`RowParserBuilder`] with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of fields a row may have.
    ///
    /// Will default to `500`.
    pub fn max_columns(&mut self, max: usize) -> &mut Self {
        self.max_columns = max;
        self
    }

    /// Set the maximum length of a row, its terminating newline included.
    ///
    /// This is also the number of bytes the inner buffer is able to carry
    /// over when refilling, so it drives memory usage.
    ///
    /// Will default to 32 KiB.
    pub fn max_row_len(&mut self, max: usize) -> &mut Self {
        self.max_row_len = max;
        self
    }

    /// Set the number of (decompressed) bytes produced by each buffer refill.
    ///
    /// Will default to 1 MiB.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the size of the chunks read from a gzip compressed input.
    ///
    /// Will default to 64 KiB.
    pub fn raw_capacity(&mut self, capacity: usize) -> &mut Self {
        self.raw_capacity = capacity;
        self
    }

    /// Set the compression of the input.
    ///
    /// Will default to [`Compression::Auto`].
    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Indicate whether the created [`RowParser`] must refrain from using SIMD
    /// instructions.
    ///
    /// Will default to `false`.
    pub fn scalar(&mut self, yes: bool) -> &mut Self {
        self.scalar = yes;
        self
    }

    /// Indicate whether gzip CRC-32 checksums must be verified.
    ///
    /// Will default to `true`.
    pub fn verify_checksum(&mut self, yes: bool) -> &mut Self {
        self.verify_checksum = yes;
        self
    }

    /// Create a new [`RowParser`] reading the file found at `path`.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> error::Result<RowParser<File>> {
        self.from_reader(File::open(path)?)
    }

    /// Create a new [`RowParser`] using the provided reader implementing
    /// [`std::io::Read`].
    ///
    /// With [`Compression::Auto`], the first bytes of the reader are read
    /// right away to detect gzip data.
    pub fn from_reader<R: Read>(&self, reader: R) -> error::Result<RowParser<R>> {
        let max_columns = self.max_columns.max(1);
        let slack = self.max_row_len.max(SCAN_WIDTH) + SCAN_WIDTH;

        // Refills produce at least a whole row margin
        let config = BufferConfig {
            slack,
            capacity: self.buffer_capacity.max(slack),
            raw_capacity: self.raw_capacity.max(SCAN_WIDTH),
            verify_checksum: self.verify_checksum,
        };

        let buffer = InputBuffer::open(reader, self.compression, config)?;

        let scanner = if self.scalar {
            Scanner::scalar()
        } else {
            Scanner::new()
        };

        Ok(RowParser {
            buffer,
            scanner,
            columns: Vec::with_capacity(max_columns + 1),
            max_columns,
            expected_len: None,
            headers: ByteRecord::new(),
            state: RowState::AwaitingFirstRow,
            has_row: false,
            must_reemit_first_row: false,
            pos: 0,
            row_start: 0,
            base: 0,
            index: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    AwaitingFirstRow,
    Streaming,
    Exhausted,
}

/// A streaming, zero-copy parser of newline terminated CSV rows.
///
/// Fields are split on every comma and rows on every newline: quoting is not
/// supported. Every row must have the same number of fields as the first one.
///
/// Rows are views into the parser's buffer, borrowed until the next call to
/// [`RowParser::advance`].
///
/// # Configuration
///
/// To configure a [`RowParser`], if you need to accept wider or longer rows
/// for instance, check out the [`RowParserBuilder`].
pub struct RowParser<R> {
    buffer: InputBuffer<R>,
    scanner: Scanner,
    columns: Vec<usize>,
    max_columns: usize,
    expected_len: Option<usize>,
    headers: ByteRecord,
    state: RowState,
    has_row: bool,
    must_reemit_first_row: bool,
    // Scan position and current row start, relative to the buffer storage
    pos: usize,
    row_start: usize,
    // Number of bytes shifted out of the buffer so far
    base: u64,
    index: u64,
}

impl RowParser<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        RowParserBuilder::new().from_path(path)
    }
}

impl<R: Read> RowParser<R> {
    pub fn from_reader(reader: R) -> error::Result<Self> {
        RowParserBuilder::new().from_reader(reader)
    }

    #[inline(always)]
    fn error_pos(&self) -> (u64, u64) {
        (self.base + self.row_start as u64, self.index)
    }

    // Rows are bounded by what the buffer is able to keep across refills,
    // minus a scan window.
    #[inline(always)]
    fn max_row_len(&self) -> usize {
        self.buffer.slack() - SCAN_WIDTH
    }

    fn refill(&mut self, keep_from: usize) -> error::Result<()> {
        let kept = self.buffer.end() - keep_from;
        let produced = self.buffer.refill(keep_from)?;

        log::trace!(
            "refill at byte {}: kept {} bytes, produced {} bytes",
            self.base + keep_from as u64,
            kept,
            produced
        );

        for column in self.columns.iter_mut() {
            *column -= keep_from;
        }

        self.pos -= keep_from;
        self.row_start -= keep_from;
        self.base += keep_from as u64;

        Ok(())
    }

    fn parse_row(&mut self) -> error::Result<bool> {
        let margin = self.buffer.slack();

        if !self.buffer.is_eof() && self.buffer.end() - self.pos < margin {
            self.row_start = self.pos;
            self.columns.clear();
            self.refill(self.pos)?;
        }

        if self.pos == self.buffer.end() && self.buffer.is_eof() {
            log::debug!(
                "end of stream reached after {} rows ({} bytes)",
                self.index,
                self.position()
            );

            self.state = RowState::Exhausted;
            return Ok(false);
        }

        self.row_start = self.pos;
        self.columns.clear();
        self.columns.push(self.pos);

        loop {
            let end = self.buffer.end();

            if self.pos >= end {
                if self.buffer.is_eof() {
                    return Err(Error::new(ErrorKind::Truncated {
                        pos: self.error_pos(),
                    }));
                }

                if end - self.row_start >= self.max_row_len() {
                    return Err(Error::new(ErrorKind::RowTooLong {
                        max_row_len: self.max_row_len(),
                        pos: self.error_pos(),
                    }));
                }

                self.refill(self.row_start)?;
                continue;
            }

            let window = &self.buffer.storage()[self.pos..];
            let valid = valid_bits(end - self.pos);
            let newlines = self.scanner.mask(window, b'\n') & valid;

            match lowest_set_bit(newlines) {
                None => {
                    let commas = self.scanner.mask(window, b',') & valid;

                    if self.columns.len() + commas.count_ones() as usize > self.max_columns {
                        return Err(Error::new(ErrorKind::TooManyColumns {
                            max_columns: self.max_columns,
                            pos: self.error_pos(),
                        }));
                    }

                    for offset in MaskIter::new(commas) {
                        self.columns.push(self.pos + offset + 1);
                    }

                    self.pos += SCAN_WIDTH.min(end - self.pos);
                }
                Some(newline) => {
                    for offset in memchr_iter(b',', &window[..newline]) {
                        if self.columns.len() == self.max_columns {
                            return Err(Error::new(ErrorKind::TooManyColumns {
                                max_columns: self.max_columns,
                                pos: self.error_pos(),
                            }));
                        }

                        self.columns.push(self.pos + offset + 1);
                    }

                    self.pos += newline + 1;
                    self.columns.push(self.pos);
                    break;
                }
            }
        }

        if self.pos - self.row_start > self.max_row_len() {
            return Err(Error::new(ErrorKind::RowTooLong {
                max_row_len: self.max_row_len(),
                pos: self.error_pos(),
            }));
        }

        let len = self.columns.len() - 1;

        match self.expected_len {
            None => {
                self.expected_len = Some(len);
                self.headers = self.current_row().to_byte_record();
                self.state = RowState::Streaming;
            }
            Some(expected_len) if expected_len != len => {
                return Err(Error::new(ErrorKind::UnequalLengths {
                    expected_len,
                    len,
                    pos: Some(self.error_pos()),
                }));
            }
            _ => (),
        }

        self.index += 1;

        Ok(true)
    }

    /// Move to the next row of the stream.
    ///
    /// Returns `false` when the stream is exhausted, i.e. when it ended right
    /// after the last row's newline. Every error is fatal: the parser is
    /// exhausted after returning one.
    pub fn advance(&mut self) -> error::Result<bool> {
        if self.must_reemit_first_row {
            self.must_reemit_first_row = false;
            return Ok(true);
        }

        self.has_row = false;

        if self.state == RowState::Exhausted {
            return Ok(false);
        }

        match self.parse_row() {
            Ok(has_row) => {
                self.has_row = has_row;
                Ok(has_row)
            }
            Err(err) => {
                self.state = RowState::Exhausted;
                Err(err)
            }
        }
    }

    #[inline(always)]
    fn current_row(&self) -> Row<'_> {
        Row::new(self.buffer.storage(), &self.columns)
    }

    /// Returns the row reached by the last call to [`RowParser::advance`],
    /// if any.
    #[inline]
    pub fn row(&self) -> Option<Row<'_>> {
        (self.has_row && !self.must_reemit_first_row).then(|| self.current_row())
    }

    /// Advance and return the next row, or `None` when the stream is
    /// exhausted.
    #[inline]
    pub fn read_row(&mut self) -> error::Result<Option<Row<'_>>> {
        if self.advance()? {
            Ok(self.row())
        } else {
            Ok(None)
        }
    }

    /// Returns whether the stream has been fully consumed, or whether an
    /// error occurred.
    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.state == RowState::Exhausted
    }

    /// Number of fields of every row, known once the first row was read.
    #[inline(always)]
    pub fn column_count(&self) -> Option<usize> {
        self.expected_len
    }

    /// Returns whether the input is being decompressed.
    #[inline(always)]
    pub fn is_gzip(&self) -> bool {
        self.buffer.is_gzip()
    }

    /// Returns the first row of the stream, reading it if needed. An empty
    /// stream has empty headers.
    ///
    /// Reading the first row this way does not consume it: the next call to
    /// [`RowParser::advance`] will still yield it.
    pub fn headers(&mut self) -> error::Result<&ByteRecord> {
        if self.state == RowState::AwaitingFirstRow {
            self.must_reemit_first_row = self.advance()?;
        }

        Ok(&self.headers)
    }

    /// Find the index of each given column name in the headers, the first
    /// matching column winning when names are duplicated.
    pub fn header_indices<N: AsRef<[u8]>>(
        &mut self,
        names: &[N],
    ) -> error::Result<Vec<Option<usize>>> {
        let headers = self.headers()?;

        Ok(names
            .iter()
            .map(|name| headers.iter().position(|cell| cell == name.as_ref()))
            .collect())
    }

    /// Returns an iterator yielding every remaining row as an owned
    /// [`ByteRecord`].
    pub fn byte_records(&mut self) -> ByteRecordsIter<'_, R> {
        ByteRecordsIter { parser: self }
    }

    /// Returns the byte offset, in the (decompressed) stream, right after the
    /// current row's newline, i.e. where the next row starts. This is `0`
    /// before any row is read and the stream length once it is exhausted.
    #[inline(always)]
    pub fn position(&self) -> u64 {
        if self.must_reemit_first_row {
            0
        } else {
            self.base + self.pos as u64
        }
    }

    /// Returns the number of rows read so far.
    #[inline(always)]
    pub fn index(&self) -> u64 {
        if self.must_reemit_first_row {
            0
        } else {
            self.index
        }
    }
}

pub struct ByteRecordsIter<'p, R> {
    parser: &'p mut RowParser<R>,
}

impl<R: Read> Iterator for ByteRecordsIter<'_, R> {
    type Item = error::Result<ByteRecord>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self.parser.read_row() {
            Ok(Some(row)) => Some(Ok(row.to_byte_record())),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Write};

    use flate2::write::GzEncoder;

    use super::*;

    impl RowParserBuilder {
        fn from_bytes(&self, data: &[u8]) -> RowParser<Cursor<Vec<u8>>> {
            self.from_reader(Cursor::new(data.to_vec())).unwrap()
        }
    }

    // Hands out a single byte per read call.
    struct SlowReader<R>(R);

    impl<R: Read> Read for SlowReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn collect_rows<R: Read>(parser: &mut RowParser<R>) -> error::Result<Vec<Vec<Vec<u8>>>> {
        let mut rows = Vec::new();

        while let Some(row) = parser.read_row()? {
            rows.push(row.iter().map(|field| field.to_vec()).collect());
        }

        Ok(rows)
    }

    fn rejoin(rows: &[Vec<Vec<u8>>]) -> Vec<u8> {
        let mut data = Vec::new();

        for row in rows {
            data.extend_from_slice(&row.join(&b","[..]));
            data.push(b'\n');
        }

        data
    }

    // Rows of varying widths, some of them crossing 64 bytes windows.
    fn sample(rows: usize, columns: usize) -> Vec<u8> {
        let mut data = Vec::new();

        for i in 0..rows {
            let fields = (0..columns)
                .map(|j| match (i * 31 + j * 7) % 5 {
                    0 => String::new(),
                    1 => format!("{}", i * j),
                    2 => "x".repeat((i + j) % 70),
                    3 => format!("field-{}-{}", i, j),
                    _ => "\r".to_string(),
                })
                .collect::<Vec<_>>();

            data.extend_from_slice(fields.join(",").as_bytes());
            data.push(b'\n');
        }

        data
    }

    #[test]
    fn test_concrete_scenario() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("a,b,c\n1,2,3\n4,5,6\n"))?;

        assert!(parser.row().is_none());
        assert_eq!(parser.column_count(), None);
        assert_eq!(parser.position(), 0);

        assert!(parser.advance()?);
        assert_eq!(parser.row().unwrap().to_byte_record(), brec!["a", "b", "c"]);
        assert_eq!(parser.column_count(), Some(3));
        assert_eq!(parser.position(), 6);

        assert!(parser.advance()?);
        assert_eq!(parser.row().unwrap().to_byte_record(), brec!["1", "2", "3"]);
        assert_eq!(parser.position(), 12);

        assert!(parser.advance()?);
        assert_eq!(parser.position(), 18);
        let row = parser.row().unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(&row[0], b"4");
        assert_eq!(&row[-1], b"6");
        assert_eq!(row.as_slice(), b"4,5,6\n");
        assert_eq!(row.as_raw(), b"4,5,6");

        assert!(!parser.advance()?);
        assert!(parser.is_exhausted());
        assert!(parser.row().is_none());
        assert_eq!(parser.index(), 3);
        assert_eq!(parser.position(), 18);

        // Exhaustion is terminal
        assert!(!parser.advance()?);

        Ok(())
    }

    #[test]
    fn test_round_trip() -> error::Result<()> {
        let data = sample(300, 7);

        let mut expected = None;

        for capacity in [1, 64, 100, 1000, 1 << 20] {
            for max_row_len in [512, 1000] {
                let mut parser = RowParserBuilder::new()
                    .buffer_capacity(capacity)
                    .max_row_len(max_row_len)
                    .from_bytes(&data);

                let rows = collect_rows(&mut parser)?;

                assert_eq!(rows.len(), 300);
                assert!(rows.iter().all(|row| row.len() == 7));
                assert!(rejoin(&rows) == data);
                assert_eq!(parser.position(), data.len() as u64);

                match &expected {
                    None => expected = Some(rows),
                    Some(expected) => assert!(&rows == expected),
                }
            }
        }

        Ok(())
    }

    #[test]
    fn test_slow_reader() -> error::Result<()> {
        let data = sample(50, 4);

        let mut parser = RowParserBuilder::new()
            .max_row_len(256)
            .buffer_capacity(64)
            .from_reader(SlowReader(Cursor::new(data.clone())))?;

        let rows = collect_rows(&mut parser)?;

        assert_eq!(rows.len(), 50);
        assert!(rejoin(&rows) == data);

        Ok(())
    }

    #[test]
    fn test_scalar_equivalence() -> error::Result<()> {
        let data = sample(500, 9);

        let mut simd = RowParserBuilder::new().buffer_capacity(777).from_bytes(&data);
        let mut scalar = RowParserBuilder::new()
            .buffer_capacity(777)
            .scalar(true)
            .from_bytes(&data);

        loop {
            let has_row = simd.advance()?;
            assert_eq!(has_row, scalar.advance()?);

            if !has_row {
                break;
            }

            let (simd_row, scalar_row) = (simd.row().unwrap(), scalar.row().unwrap());

            assert_eq!(simd_row.as_slice(), scalar_row.as_slice());
            assert!(simd_row.iter().eq(scalar_row.iter()));
        }

        Ok(())
    }

    #[test]
    fn test_unequal_lengths() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("a,b\n1,2,3\n4,5\n"))?;

        assert!(parser.advance()?);

        let err = parser.advance().unwrap_err();

        match err.kind() {
            ErrorKind::UnequalLengths {
                expected_len,
                len,
                pos,
            } => {
                assert_eq!(*expected_len, 2);
                assert_eq!(*len, 3);
                assert_eq!(*pos, Some((4, 1)));
            }
            _ => panic!("unexpected error: {}", err),
        }

        assert!(!err.is_config_error());

        // Fatal
        assert!(parser.is_exhausted());
        assert!(!parser.advance()?);

        let mut parser = RowParser::from_reader(Cursor::new("a,b,c\n1,2\n"))?;
        assert!(parser.advance()?);
        assert!(parser.advance().is_err());

        Ok(())
    }

    #[test]
    fn test_too_many_columns() -> error::Result<()> {
        let mut parser = RowParserBuilder::new()
            .max_columns(3)
            .from_bytes(b"a,b,c\n1,2,3\n");

        assert_eq!(collect_rows(&mut parser)?.len(), 2);

        // Within the newline's window
        let mut parser = RowParserBuilder::new()
            .max_columns(3)
            .from_bytes(b"a,b,c,d\n");

        let err = parser.advance().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TooManyColumns { max_columns: 3, .. }));
        assert!(err.is_config_error());

        // Before the newline's window
        let data = format!("{},{}\n", ",".repeat(10), "x".repeat(100));
        let mut parser = RowParserBuilder::new()
            .max_columns(5)
            .from_bytes(data.as_bytes());

        let err = parser.advance().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TooManyColumns { max_columns: 5, .. }));
        assert!(err.is_config_error());

        Ok(())
    }

    #[test]
    fn test_boundary_straddling() -> error::Result<()> {
        let max_row_len = 100;

        // Rows whose length, newline included, is exactly the maximum
        let row = format!("{},{}\n", "a".repeat(49), "b".repeat(49));
        assert_eq!(row.len(), max_row_len);

        let data = row.repeat(40);

        for capacity in [1, 63, 64, 99, 100, 101, 1000] {
            let mut parser = RowParserBuilder::new()
                .max_row_len(max_row_len)
                .buffer_capacity(capacity)
                .from_bytes(data.as_bytes());

            let rows = collect_rows(&mut parser)?;

            assert_eq!(rows.len(), 40);
            assert!(rejoin(&rows) == data.as_bytes());
        }

        // One byte too long
        let data = format!("a,b\n{},{}\n", "a".repeat(50), "b".repeat(49)).repeat(3);

        for capacity in [1, 64, 1000] {
            let mut parser = RowParserBuilder::new()
                .max_row_len(max_row_len)
                .buffer_capacity(capacity)
                .from_bytes(data.as_bytes());

            assert!(parser.advance()?);

            let err = parser.advance().unwrap_err();

            match err.kind() {
                ErrorKind::RowTooLong { max_row_len, pos } => {
                    assert_eq!(*max_row_len, 100);
                    assert_eq!(*pos, (4, 1));
                }
                _ => panic!("unexpected error: {}", err),
            }

            assert!(err.is_config_error());
            assert!(parser.is_exhausted());
        }

        Ok(())
    }

    #[test]
    fn test_buffer_sizes() {
        for (max_row_len, capacity) in [(100, 1), (100, 10_000), (0, 0), (1000, 64)] {
            let parser = RowParserBuilder::new()
                .max_row_len(max_row_len)
                .buffer_capacity(capacity)
                .from_bytes(b"a\n");

            let max_row_len = max_row_len.max(SCAN_WIDTH);
            let slack = max_row_len + SCAN_WIDTH;

            assert_eq!(parser.buffer.slack(), slack);
            assert_eq!(parser.max_row_len(), max_row_len);
            assert_eq!(
                parser.buffer.storage().len(),
                slack + capacity.max(slack) + SCAN_WIDTH
            );
        }
    }

    #[test]
    fn test_refills_per_row() -> error::Result<()> {
        let data = format!("{},{}\n", "a".repeat(80), "b".repeat(9)).repeat(1000);

        let mut parser = RowParserBuilder::new()
            .max_row_len(100)
            .buffer_capacity(1)
            .from_bytes(data.as_bytes());

        let traces = capture_traces(|| {
            assert_eq!(collect_rows(&mut parser)?.len(), 1000);
            Ok(())
        })?;

        // Each refill carries at least a whole row margin of fresh bytes
        let refills = traces.iter().filter(|t| t.starts_with("refill")).count();
        assert!(refills <= data.len() / 164 + 4, "refills={}", refills);

        Ok(())
    }

    thread_local! {
        static TRACES: std::cell::RefCell<Vec<String>> = const { std::cell::RefCell::new(Vec::new()) };
    }

    // Keeps this crate's parser log lines emitted by the current thread.
    struct TraceCapture;

    impl log::Log for TraceCapture {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if record.target() == "fastcsv::parser" {
                TRACES.with(|traces| traces.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: TraceCapture = TraceCapture;

    fn capture_traces<F>(f: F) -> error::Result<Vec<String>>
    where
        F: FnOnce() -> error::Result<()>,
    {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        TRACES.with(|traces| traces.borrow_mut().clear());
        f()?;

        Ok(TRACES.with(|traces| traces.borrow_mut().drain(..).collect()))
    }

    #[test]
    fn test_refill_traces() -> error::Result<()> {
        let csv = b"a,b\n1,2\n";

        let mut parser = RowParserBuilder::new()
            .compression(Compression::None)
            .from_bytes(csv);

        let traces = capture_traces(|| {
            assert_eq!(collect_rows(&mut parser)?.len(), 2);
            Ok(())
        })?;

        let refills = traces
            .iter()
            .filter(|t| t.starts_with("refill"))
            .collect::<Vec<_>>();

        assert_eq!(
            refills,
            vec![
                "refill at byte 0: kept 0 bytes, produced 8 bytes",
                "refill at byte 4: kept 4 bytes, produced 0 bytes",
            ]
        );

        let mut parser = RowParserBuilder::new().from_bytes(&gzip(csv));

        let traces = capture_traces(|| {
            assert_eq!(collect_rows(&mut parser)?.len(), 2);
            Ok(())
        })?;

        assert!(traces
            .iter()
            .any(|t| t == "refill at byte 0: kept 0 bytes, produced 8 bytes"));

        Ok(())
    }

    #[test]
    fn test_truncated() -> error::Result<()> {
        for capacity in [1, 1000] {
            let mut parser = RowParserBuilder::new()
                .buffer_capacity(capacity)
                .from_bytes(b"a,b\n1,2\n3,4");

            assert!(parser.advance()?);
            assert!(parser.advance()?);

            let err = parser.advance().unwrap_err();

            match err.kind() {
                ErrorKind::Truncated { pos } => assert_eq!(*pos, (8, 2)),
                _ => panic!("unexpected error: {}", err),
            }

            assert!(parser.is_exhausted());
        }

        Ok(())
    }

    #[test]
    fn test_empty_input() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new(""))?;

        assert!(!parser.advance()?);
        assert!(parser.is_exhausted());
        assert_eq!(parser.column_count(), None);

        let mut parser = RowParser::from_reader(Cursor::new(""))?;
        assert!(parser.headers()?.is_empty());
        assert!(parser.read_row()?.is_none());

        Ok(())
    }

    #[test]
    fn test_empty_lines() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("name\n\n\njohn\n"))?;

        assert_eq!(
            collect_rows(&mut parser)?,
            vec![vec![b"name".to_vec()], vec![vec![]], vec![vec![]], vec![b"john".to_vec()]]
        );

        Ok(())
    }

    #[test]
    fn test_crlf() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("a,b\r\n1,2\r\n"))?;

        let row = parser.read_row()?.unwrap();
        assert_eq!(&row[-1], b"b\r");

        Ok(())
    }

    #[test]
    fn test_gzip() -> error::Result<()> {
        let csv = b"x,y\n1,2\n";

        for capacity in [1, 8, 1000] {
            for raw_capacity in [1, 12, 1000] {
                let mut parser = RowParserBuilder::new()
                    .buffer_capacity(capacity)
                    .raw_capacity(raw_capacity)
                    .from_bytes(&gzip(csv));

                assert!(parser.is_gzip());
                assert_eq!(
                    collect_rows(&mut parser)?,
                    vec![
                        vec![b"x".to_vec(), b"y".to_vec()],
                        vec![b"1".to_vec(), b"2".to_vec()]
                    ]
                );
                assert_eq!(parser.position(), 8);
            }
        }

        Ok(())
    }

    #[test]
    fn test_gzip_multi_member() -> error::Result<()> {
        let data = sample(400, 5);
        let (first, second) = data.split_at(data.len() / 3);

        // Split in the middle of a row on purpose
        let mut compressed = gzip(first);
        compressed.extend(gzip(second));

        let mut parser = RowParserBuilder::new()
            .buffer_capacity(500)
            .raw_capacity(100)
            .from_bytes(&compressed);

        let rows = collect_rows(&mut parser)?;

        assert_eq!(rows.len(), 400);
        assert!(rejoin(&rows) == data);

        Ok(())
    }

    #[test]
    fn test_forced_compression() -> error::Result<()> {
        let mut parser = RowParserBuilder::new()
            .compression(Compression::Gzip)
            .from_bytes(b"a,b\n");

        assert!(parser.advance().is_err());

        let mut parser = RowParserBuilder::new()
            .compression(Compression::None)
            .from_bytes(b"a,b\n");

        assert!(!parser.is_gzip());
        assert_eq!(collect_rows(&mut parser)?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_headers() -> error::Result<()> {
        let data = b"name,surname,name\njohn,dandy,jack\n";

        // Call before reading
        let mut parser = RowParser::from_reader(Cursor::new(data))?;
        assert_eq!(parser.headers()?, &brec!["name", "surname", "name"]);
        assert_eq!(parser.index(), 0);
        assert_eq!(parser.position(), 0);
        assert!(parser.row().is_none());
        assert_eq!(
            parser.read_row()?.unwrap().to_byte_record(),
            brec!["name", "surname", "name"]
        );
        assert_eq!(
            parser.read_row()?.unwrap().to_byte_record(),
            brec!["john", "dandy", "jack"]
        );
        assert!(parser.read_row()?.is_none());

        // Call after reading
        let mut parser = RowParser::from_reader(Cursor::new(data))?;
        assert!(parser.advance()?);
        assert!(parser.advance()?);
        assert_eq!(parser.headers()?, &brec!["name", "surname", "name"]);
        assert_eq!(
            parser.row().unwrap().to_byte_record(),
            brec!["john", "dandy", "jack"]
        );

        Ok(())
    }

    #[test]
    fn test_header_indices() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("id,name,age,name\n1,john,45,jack\n"))?;

        assert_eq!(
            parser.header_indices(&["name", "age", "missing", "id"])?,
            vec![Some(1), Some(2), None, Some(0)]
        );

        assert_eq!(collect_rows(&mut parser)?.len(), 2);

        Ok(())
    }

    #[test]
    fn test_byte_records() -> error::Result<()> {
        let mut parser = RowParser::from_reader(Cursor::new("a,b\n1,2\n3\n"))?;

        let mut records = parser.byte_records();

        assert_eq!(records.next().unwrap()?, brec!["a", "b"]);
        assert_eq!(records.next().unwrap()?, brec!["1", "2"]);
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());

        let mut parser = RowParser::from_reader(Cursor::new("a,b\n1,2\n"))?;
        let records = parser.byte_records().collect::<error::Result<Vec<_>>>()?;
        assert_eq!(records, vec![brec!["a", "b"], brec!["1", "2"]]);

        Ok(())
    }
}
