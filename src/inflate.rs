use miniz_oxide::inflate::core::inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
use miniz_oxide::inflate::core::{decompress, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

use crate::error::{self, Error, ErrorKind};

/// Size of the deflate back-reference window. Must be a power of two since
/// the decompressor wraps around it.
pub const DICT_SIZE: usize = 32 * 1024;

/// Outcome of a single [`DeflateWindow::inflate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflateProgress {
    /// Number of compressed bytes consumed.
    pub consumed: usize,
    /// Number of decompressed bytes written into the output.
    pub produced: usize,
    /// Whether the deflate stream ended and every byte was delivered.
    pub done: bool,
}

/// Streaming raw deflate decoder writing into caller-sized output slices.
///
/// Decompression happens inside a circular 32 KiB dictionary so that
/// back-references can reach bytes already handed out in earlier calls.
/// Bytes that did not fit into the caller's output are kept there and
/// delivered first on the next call.
pub struct DeflateWindow {
    state: Box<DecompressorOxide>,
    dict: Box<[u8]>,
    // Start of the undelivered bytes, which is also where the decompressor
    // writes next when nothing is pending.
    offset: usize,
    pending: usize,
    has_more_output: bool,
    finished: bool,
}

impl Default for DeflateWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DeflateWindow {
    pub fn new() -> Self {
        Self {
            state: Box::default(),
            dict: vec![0; DICT_SIZE].into_boxed_slice(),
            offset: 0,
            pending: 0,
            has_more_output: false,
            finished: false,
        }
    }

    /// Forget everything about the current stream, to decode a new one.
    pub fn reset(&mut self) {
        self.state.init();
        self.offset = 0;
        self.pending = 0;
        self.has_more_output = false;
        self.finished = false;
    }

    /// Whether the stream ended and every decompressed byte was delivered.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.finished && self.pending == 0
    }

    #[inline]
    fn drain(&mut self, output: &mut [u8]) -> usize {
        let amt = self.pending.min(output.len());

        output[..amt].copy_from_slice(&self.dict[self.offset..self.offset + amt]);

        self.pending -= amt;
        self.offset = (self.offset + amt) & (DICT_SIZE - 1);

        amt
    }

    /// Decompress as much of `input` as fits into `output`.
    ///
    /// `has_more_input` tells whether more compressed bytes may follow
    /// `input`. When it is `false`, a stream not ending within `input` is
    /// reported as an error.
    pub fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        has_more_input: bool,
    ) -> error::Result<InflateProgress> {
        let mut consumed = 0;
        let mut produced = self.drain(output);

        let flags = if has_more_input {
            TINFL_FLAG_HAS_MORE_INPUT
        } else {
            0
        };

        while !self.finished && self.pending == 0 && produced < output.len() {
            if consumed == input.len() && !self.has_more_output && has_more_input {
                break;
            }

            let (status, read, written) = decompress(
                &mut self.state,
                &input[consumed..],
                &mut self.dict,
                self.offset,
                flags,
            );

            consumed += read;
            self.pending = written;
            produced += self.drain(&mut output[produced..]);

            match status {
                TINFLStatus::Done => {
                    self.finished = true;
                }
                TINFLStatus::HasMoreOutput => {
                    self.has_more_output = true;
                }
                TINFLStatus::NeedsMoreInput => {
                    self.has_more_output = false;

                    if !has_more_input {
                        return Err(Error::new(ErrorKind::TruncatedGzip));
                    }

                    if read == 0 && written == 0 {
                        break;
                    }
                }
                TINFLStatus::FailedCannotMakeProgress => {
                    return Err(Error::new(ErrorKind::TruncatedGzip));
                }
                _ => {
                    return Err(Error::new(ErrorKind::InvalidDeflate(
                        "corrupt deflate stream",
                    )));
                }
            }
        }

        Ok(InflateProgress {
            consumed,
            produced,
            done: self.is_done(),
        })
    }
}
