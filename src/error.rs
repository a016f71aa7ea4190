use std::{error, fmt, io, result};

/// The specific type of an error.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Wrap a [std::io::Error].
    Io(io::Error),

    /// Indicate that a row has a different number of fields than the first
    /// row of the document.
    UnequalLengths {
        /// Expected number of fields
        expected_len: usize,
        /// Actual and incorrect number of fields observed
        len: usize,
        /// Optional position `(byte_offset, row_index)`
        pos: Option<(u64, u64)>,
    },

    /// Indicate that a row has more fields than the parser was configured to
    /// hold.
    TooManyColumns {
        /// Configured maximum number of columns
        max_columns: usize,
        /// Position `(byte_offset, row_index)`
        pos: (u64, u64),
    },

    /// Indicate that a row, newline included, does not fit into the
    /// configured row slack of the buffer.
    RowTooLong {
        /// Configured maximum row length, in bytes
        max_row_len: usize,
        /// Position `(byte_offset, row_index)`
        pos: (u64, u64),
    },

    /// Indicate that the stream ended in the middle of a row, i.e. that its
    /// last row lacks a terminating newline.
    Truncated {
        /// Position `(byte_offset, row_index)` of the unterminated row
        pos: (u64, u64),
    },

    /// Indicate that a gzip member uses a compression method other than
    /// deflate.
    UnsupportedCompressionMethod(u8),

    /// Indicate that a gzip member header is malformed.
    InvalidGzipHeader(&'static str),

    /// Indicate that the length stored in a gzip footer does not match the
    /// number of bytes actually decompressed.
    CorruptFooter {
        /// Length (modulo 2^32) stored in the footer
        expected: u32,
        /// Length (modulo 2^32) actually decompressed
        actual: u32,
    },

    /// Indicate that the CRC-32 stored in a gzip footer (or header CRC)
    /// does not match the decompressed data.
    ChecksumMismatch {
        /// Checksum stored in the stream
        expected: u32,
        /// Checksum computed over the data
        actual: u32,
    },

    /// Indicate that the deflate stream is malformed.
    InvalidDeflate(&'static str),

    /// Indicate that the compressed input ended inside a gzip member.
    TruncatedGzip,
}

/// An error occurring when reading CSV data.
#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self(kind)
    }

    /// Return whether the wrapped error is a [`std::io::Error`].
    pub fn is_io_error(&self) -> bool {
        matches!(self.0, ErrorKind::Io(_))
    }

    /// Return whether the error comes from the parser configuration (too
    /// many columns or a row too long for the buffer) rather than from the
    /// data itself.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::TooManyColumns { .. } | ErrorKind::RowTooLong { .. }
        )
    }

    /// Return a reference to the underlying [`ErrorKind`].
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwraps the error into its underlying [`ErrorKind`].
    pub fn into_kind(self) -> ErrorKind {
        self.0
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err.0 {
            ErrorKind::Io(inner) => inner,
            kind => Self::new(io::ErrorKind::InvalidData, Error(kind)),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.0 {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::UnequalLengths {
                expected_len,
                len,
                pos: Some((byte, index)),
            } => write!(
                f,
                "CSV error: row {} (byte: {}): found row with {} fields, but the first row has {} fields",
                index, byte, len, expected_len
            ),
            ErrorKind::UnequalLengths {
                expected_len,
                len,
                pos: None,
            } => write!(
                f,
                "CSV error: found row with {} fields, but the first row has {} fields",
                len, expected_len
            ),
            ErrorKind::TooManyColumns {
                max_columns,
                pos: (byte, index),
            } => write!(
                f,
                "CSV error: row {} (byte: {}) has more than {} columns",
                index, byte, max_columns
            ),
            ErrorKind::RowTooLong {
                max_row_len,
                pos: (byte, index),
            } => write!(
                f,
                "CSV error: row {} (byte: {}) is longer than {} bytes, increase the maximum row length",
                index, byte, max_row_len
            ),
            ErrorKind::Truncated { pos: (byte, index) } => write!(
                f,
                "CSV error: row {} (byte: {}) is not terminated by a newline",
                index, byte
            ),
            ErrorKind::UnsupportedCompressionMethod(method) => write!(
                f,
                "gzip error: unsupported compression method {} (only deflate is supported)",
                method
            ),
            ErrorKind::InvalidGzipHeader(reason) => write!(f, "gzip error: {}", reason),
            ErrorKind::CorruptFooter { expected, actual } => write!(
                f,
                "gzip error: footer declares {} bytes but {} were decompressed",
                expected, actual
            ),
            ErrorKind::ChecksumMismatch { expected, actual } => write!(
                f,
                "gzip error: checksum mismatch (expected {:#010x}, got {:#010x})",
                expected, actual
            ),
            ErrorKind::InvalidDeflate(reason) => write!(f, "deflate error: {}", reason),
            ErrorKind::TruncatedGzip => write!(f, "gzip error: unexpected end of compressed data"),
        }
    }
}

/// A type alias for `Result<T, fastcsv::Error>`.
pub type Result<T> = result::Result<T, Error>;
