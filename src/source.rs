use std::io::{self, Chain, Cursor, Read};

use crate::buffer::{ByteBuffer, RawBuffer};
use crate::error;
use crate::gzip::{GzipBuffer, MAGIC};

/// Compression of the input given to a [`RowParser`](crate::RowParser).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Detect gzip data by its magic bytes.
    #[default]
    Auto,
    /// Plain CSV data.
    None,
    /// Gzip compressed CSV data, possibly made of several members.
    Gzip,
}

/// A reader whose first bytes may already have been consumed for sniffing.
pub(crate) type Sniffed<R> = Chain<Cursor<Vec<u8>>, R>;

// Read up to two bytes to check for the gzip magic, then give them back in
// front of the reader.
fn sniff<R: Read>(mut reader: R) -> io::Result<(bool, Sniffed<R>)> {
    let mut prefix = Vec::with_capacity(MAGIC.len());

    (&mut reader)
        .take(MAGIC.len() as u64)
        .read_to_end(&mut prefix)?;

    let is_gzip = prefix == MAGIC;

    Ok((is_gzip, Cursor::new(prefix).chain(reader)))
}

fn unsniffed<R: Read>(reader: R) -> Sniffed<R> {
    Cursor::new(Vec::new()).chain(reader)
}

/// The buffer a [`RowParser`](crate::RowParser) scans, plain or decompressed.
pub(crate) enum InputBuffer<R> {
    Raw(RawBuffer<Sniffed<R>>),
    Gzip(GzipBuffer<Sniffed<R>>),
}

/// Sizes shared by both kinds of [`InputBuffer`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferConfig {
    pub(crate) slack: usize,
    pub(crate) capacity: usize,
    pub(crate) raw_capacity: usize,
    pub(crate) verify_checksum: bool,
}

impl<R: Read> InputBuffer<R> {
    pub(crate) fn open(
        reader: R,
        compression: Compression,
        config: BufferConfig,
    ) -> error::Result<Self> {
        let (is_gzip, reader) = match compression {
            Compression::Auto => sniff(reader)?,
            Compression::None => (false, unsniffed(reader)),
            Compression::Gzip => (true, unsniffed(reader)),
        };

        Ok(if is_gzip {
            let mut buffer = GzipBuffer::with_capacity(
                config.slack,
                config.capacity,
                config.raw_capacity,
                reader,
            );
            buffer.verify_checksum(config.verify_checksum);

            Self::Gzip(buffer)
        } else {
            Self::Raw(RawBuffer::with_capacity(
                config.slack,
                config.capacity,
                reader,
            ))
        })
    }

    pub(crate) fn is_gzip(&self) -> bool {
        matches!(self, Self::Gzip(_))
    }
}

impl<R: Read> ByteBuffer for InputBuffer<R> {
    #[inline(always)]
    fn storage(&self) -> &[u8] {
        match self {
            Self::Raw(buffer) => buffer.storage(),
            Self::Gzip(buffer) => buffer.storage(),
        }
    }

    #[inline(always)]
    fn end(&self) -> usize {
        match self {
            Self::Raw(buffer) => buffer.end(),
            Self::Gzip(buffer) => buffer.end(),
        }
    }

    #[inline(always)]
    fn is_eof(&self) -> bool {
        match self {
            Self::Raw(buffer) => buffer.is_eof(),
            Self::Gzip(buffer) => buffer.is_eof(),
        }
    }

    #[inline(always)]
    fn slack(&self) -> usize {
        match self {
            Self::Raw(buffer) => buffer.slack(),
            Self::Gzip(buffer) => buffer.slack(),
        }
    }

    fn refill(&mut self, keep_from: usize) -> error::Result<usize> {
        match self {
            Self::Raw(buffer) => buffer.refill(keep_from),
            Self::Gzip(buffer) => buffer.refill(keep_from),
        }
    }
}
