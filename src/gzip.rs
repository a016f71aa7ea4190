//! Gzip member framing (RFC 1952) around a [`DeflateWindow`].

use std::io::{self, Read};

use memchr::memchr;

use crate::buffer::{ByteBuffer, Window};
use crate::error::{self, Error, ErrorKind};
use crate::inflate::DeflateWindow;

pub(crate) const MAGIC: [u8; 2] = [0x1f, 0x8b];

const METHOD_DEFLATE: u8 = 8;
const HEADER_LEN: usize = 10;
const FOOTER_LEN: usize = 8;

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;
const RESERVED: u8 = 0b1110_0000;

#[inline]
fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn skip_zero_terminated(bytes: &[u8], pos: usize) -> Option<usize> {
    memchr(0, &bytes[pos..]).map(|offset| pos + offset + 1)
}

/// Parse the gzip member header found at the beginning of `bytes`.
///
/// Returns the byte length of the header, or `None` if `bytes` is too short
/// to hold the whole header.
pub(crate) fn parse_header(bytes: &[u8], verify_checksum: bool) -> error::Result<Option<usize>> {
    let prefix = bytes.len().min(MAGIC.len());

    if bytes[..prefix] != MAGIC[..prefix] {
        return Err(Error::new(ErrorKind::InvalidGzipHeader("invalid magic bytes")));
    }

    if bytes.len() < HEADER_LEN {
        return Ok(None);
    }

    if bytes[2] != METHOD_DEFLATE {
        return Err(Error::new(ErrorKind::UnsupportedCompressionMethod(bytes[2])));
    }

    let flags = bytes[3];

    if flags & RESERVED != 0 {
        return Err(Error::new(ErrorKind::InvalidGzipHeader(
            "reserved flag bits are set",
        )));
    }

    let mut pos = HEADER_LEN;

    if flags & FEXTRA != 0 {
        if bytes.len() < pos + 2 {
            return Ok(None);
        }

        pos += 2 + read_u16(&bytes[pos..]) as usize;

        if bytes.len() < pos {
            return Ok(None);
        }
    }

    if flags & FNAME != 0 {
        match skip_zero_terminated(bytes, pos) {
            Some(next) => pos = next,
            None => return Ok(None),
        }
    }

    if flags & FCOMMENT != 0 {
        match skip_zero_terminated(bytes, pos) {
            Some(next) => pos = next,
            None => return Ok(None),
        }
    }

    if flags & FHCRC != 0 {
        if bytes.len() < pos + 2 {
            return Ok(None);
        }

        if verify_checksum {
            let expected = read_u16(&bytes[pos..]) as u32;
            let actual = crc32fast::hash(&bytes[..pos]) & 0xffff;

            if expected != actual {
                return Err(Error::new(ErrorKind::ChecksumMismatch { expected, actual }));
            }
        }

        pos += 2;
    }

    Ok(Some(pos))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    Header,
    Body,
    Footer,
}

/// A [`ByteBuffer`] decompressing a gzip stream read from any
/// [`std::io::Read`].
///
/// Concatenated members are decoded one after the other as a single stream.
/// Every member footer is checked against the bytes actually produced.
pub struct GzipBuffer<R> {
    inner: R,
    raw: Vec<u8>,
    raw_pos: usize,
    raw_end: usize,
    raw_eof: bool,
    window: Window,
    inflater: DeflateWindow,
    state: MemberState,
    hasher: crc32fast::Hasher,
    len32: u32,
    members: u64,
    verify_checksum: bool,
    eof: bool,
}

impl<R: Read> GzipBuffer<R> {
    /// Create a buffer able to keep `slack` bytes across refills, producing up
    /// to `capacity` decompressed bytes at once and reading compressed data
    /// by chunks of `raw_capacity` bytes.
    pub fn with_capacity(slack: usize, capacity: usize, raw_capacity: usize, inner: R) -> Self {
        Self {
            inner,
            raw: vec![0; raw_capacity.max(HEADER_LEN)],
            raw_pos: 0,
            raw_end: 0,
            raw_eof: false,
            window: Window::new(slack, capacity),
            inflater: DeflateWindow::new(),
            state: MemberState::Header,
            hasher: crc32fast::Hasher::new(),
            len32: 0,
            members: 0,
            verify_checksum: true,
            eof: false,
        }
    }

    /// Indicate whether CRC-32 checksums (footer and optional header CRC)
    /// must be verified. Footer lengths are always verified.
    ///
    /// Will default to `true`.
    pub fn verify_checksum(&mut self, yes: bool) -> &mut Self {
        self.verify_checksum = yes;
        self
    }

    /// Number of gzip members whose header has been read so far.
    pub fn members(&self) -> u64 {
        self.members
    }

    /// Return the underlying reader.
    ///
    /// **BEWARE**: Already buffered data will be lost!
    pub fn into_inner(self) -> R {
        self.inner
    }

    #[inline(always)]
    fn raw_len(&self) -> usize {
        self.raw_end - self.raw_pos
    }

    // Read more compressed bytes after the unread ones. Returns the number of
    // bytes read, zero meaning the end of the compressed stream.
    fn pull(&mut self) -> io::Result<usize> {
        if self.raw_eof {
            return Ok(0);
        }

        if self.raw_pos > 0 {
            self.raw.copy_within(self.raw_pos..self.raw_end, 0);
            self.raw_end -= self.raw_pos;
            self.raw_pos = 0;
        }

        // Only a header larger than the raw chunk can get here
        if self.raw_end == self.raw.len() {
            let len = self.raw.len();
            self.raw.resize(len * 2, 0);
        }

        loop {
            match self.inner.read(&mut self.raw[self.raw_end..]) {
                Ok(0) => {
                    self.raw_eof = true;
                    return Ok(0);
                }
                Ok(amt) => {
                    self.raw_end += amt;
                    return Ok(amt);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn read_header(&mut self) -> error::Result<()> {
        loop {
            let raw = &self.raw[self.raw_pos..self.raw_end];

            if let Some(len) = parse_header(raw, self.verify_checksum)? {
                self.raw_pos += len;
                self.members += 1;
                self.state = MemberState::Body;
                self.inflater.reset();
                self.hasher = crc32fast::Hasher::new();
                self.len32 = 0;

                log::debug!("gzip member #{} starts ({} header bytes)", self.members, len);

                return Ok(());
            }

            if self.pull()? == 0 {
                // Nothing at all is an empty stream, not a truncated one
                if self.members == 0 && self.raw_len() == 0 {
                    self.eof = true;
                    return Ok(());
                }

                return Err(Error::new(ErrorKind::TruncatedGzip));
            }
        }
    }

    fn read_body(&mut self) -> error::Result<()> {
        if self.raw_len() == 0 && !self.raw_eof {
            self.pull()?;
        }

        let start = self.window.end();

        let progress = self.inflater.inflate(
            &self.raw[self.raw_pos..self.raw_end],
            self.window.spare(),
            !self.raw_eof,
        )?;

        self.raw_pos += progress.consumed;
        self.window.advance(progress.produced);
        self.len32 = self.len32.wrapping_add(progress.produced as u32);

        if self.verify_checksum {
            self.hasher
                .update(&self.window.storage()[start..self.window.end()]);
        }

        if progress.done {
            self.state = MemberState::Footer;
        } else if progress.consumed == 0 && progress.produced == 0 && self.pull()? == 0 {
            return Err(Error::new(ErrorKind::TruncatedGzip));
        }

        Ok(())
    }

    fn read_footer(&mut self) -> error::Result<()> {
        while self.raw_len() < FOOTER_LEN {
            if self.pull()? == 0 {
                return Err(Error::new(ErrorKind::TruncatedGzip));
            }
        }

        let footer = &self.raw[self.raw_pos..self.raw_pos + FOOTER_LEN];
        let crc = read_u32(&footer[..4]);
        let isize = read_u32(&footer[4..]);

        self.raw_pos += FOOTER_LEN;

        if isize != self.len32 {
            return Err(Error::new(ErrorKind::CorruptFooter {
                expected: isize,
                actual: self.len32,
            }));
        }

        if self.verify_checksum {
            let actual = std::mem::take(&mut self.hasher).finalize();

            if actual != crc {
                return Err(Error::new(ErrorKind::ChecksumMismatch {
                    expected: crc,
                    actual,
                }));
            }
        }

        log::debug!(
            "gzip member #{} ends ({} bytes mod 2^32)",
            self.members,
            self.len32
        );

        // Trailing bytes must be another member
        if self.raw_len() == 0 && self.pull()? == 0 {
            self.eof = true;
        } else {
            self.state = MemberState::Header;
        }

        Ok(())
    }
}

impl<R: Read> ByteBuffer for GzipBuffer<R> {
    #[inline(always)]
    fn storage(&self) -> &[u8] {
        self.window.storage()
    }

    #[inline(always)]
    fn end(&self) -> usize {
        self.window.end()
    }

    #[inline(always)]
    fn is_eof(&self) -> bool {
        self.eof
    }

    #[inline(always)]
    fn slack(&self) -> usize {
        self.window.slack()
    }

    fn refill(&mut self, keep_from: usize) -> error::Result<usize> {
        self.window.compact(keep_from);

        let start = self.window.end();

        while !self.eof && !self.window.is_full() {
            match self.state {
                MemberState::Header => self.read_header()?,
                MemberState::Body => self.read_body()?,
                MemberState::Footer => self.read_footer()?,
            }
        }

        Ok(self.window.end() - start)
    }
}
