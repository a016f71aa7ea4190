use std::io::{self, Read};

use crate::error;
use crate::scanner::SCAN_WIDTH;

/// A byte window able to preserve an unconsumed suffix and refill itself.
///
/// Resident bytes are `storage()[..end()]`. At least [`SCAN_WIDTH`]
/// addressable bytes always follow `end()`, so a full mask can be computed
/// from any resident position. What those bytes contain is unspecified.
pub trait ByteBuffer {
    /// The whole backing storage, padding included.
    fn storage(&self) -> &[u8];

    /// One past the last resident byte.
    fn end(&self) -> usize;

    /// Whether the underlying source has no more bytes to give.
    fn is_eof(&self) -> bool;

    /// Maximum number of bytes [`Self::refill`] is able to preserve.
    fn slack(&self) -> usize;

    /// Move `storage()[keep_from..end()]` to the beginning of the storage,
    /// then append freshly produced bytes after it.
    ///
    /// Returns the number of fresh bytes. Zero means the end of stream was
    /// reached, in which case [`Self::is_eof`] returns `true` and the kept
    /// bytes are still resident.
    ///
    /// Panics if more than [`Self::slack`] bytes would need to be kept.
    fn refill(&mut self, keep_from: usize) -> error::Result<usize>;
}

/// Fixed backing storage shared by the plain and the gzip buffers.
///
/// Layout: `[ slack | capacity | SCAN_WIDTH padding ]`. Kept bytes always fit
/// into the slack region, so a refill can always append at least `capacity`
/// fresh bytes.
#[derive(Debug)]
pub(crate) struct Window {
    data: Vec<u8>,
    end: usize,
    slack: usize,
    capacity: usize,
}

impl Window {
    pub(crate) fn new(slack: usize, capacity: usize) -> Self {
        Self {
            data: vec![0; slack + capacity + SCAN_WIDTH],
            end: 0,
            slack,
            capacity,
        }
    }

    #[inline(always)]
    pub(crate) fn storage(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub(crate) fn end(&self) -> usize {
        self.end
    }

    #[inline(always)]
    pub(crate) fn slack(&self) -> usize {
        self.slack
    }

    #[inline(always)]
    fn limit(&self) -> usize {
        self.slack + self.capacity
    }

    pub(crate) fn compact(&mut self, keep_from: usize) {
        assert!(keep_from <= self.end);

        let keep = self.end - keep_from;

        assert!(
            keep <= self.slack,
            "cannot keep {} bytes in a {} bytes slack",
            keep,
            self.slack
        );

        self.data.copy_within(keep_from..self.end, 0);
        self.end = keep;
    }

    #[inline]
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        let limit = self.limit();
        &mut self.data[self.end..limit]
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.end == self.limit()
    }

    #[inline]
    pub(crate) fn advance(&mut self, amt: usize) {
        debug_assert!(self.end + amt <= self.limit());
        self.end += amt;
    }
}

/// A [`ByteBuffer`] reading plain bytes from any [`std::io::Read`].
pub struct RawBuffer<R> {
    inner: R,
    window: Window,
    eof: bool,
}

impl<R: Read> RawBuffer<R> {
    /// Create a buffer able to keep `slack` bytes across refills and reading
    /// up to `capacity` bytes at once.
    pub fn with_capacity(slack: usize, capacity: usize, inner: R) -> Self {
        Self {
            inner,
            window: Window::new(slack, capacity),
            eof: false,
        }
    }

    /// Return the underlying reader.
    ///
    /// **BEWARE**: Already buffered data will be lost!
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteBuffer for RawBuffer<R> {
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

        if self.eof {
            return Ok(0);
        }

        loop {
            match self.inner.read(self.window.spare()) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(amt) => {
                    self.window.advance(amt);
                    return Ok(amt);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
