use std::iter::FusedIterator;

/// Number of bytes covered by a single delimiter mask.
pub const SCAN_WIDTH: usize = 64;

#[inline(always)]
fn clear_least_significant_bit(mask: u64) -> u64 {
    mask & (mask - 1)
}

/// Returns the index of the lowest set bit of `mask`, i.e. the offset of the
/// first delimiter found in the scanned window.
#[inline(always)]
pub fn lowest_set_bit(mask: u64) -> Option<usize> {
    if mask == 0 {
        None
    } else {
        Some(mask.trailing_zeros() as usize)
    }
}

/// Returns a mask keeping only the first `len` bits (all of them if `len`
/// is at least [`SCAN_WIDTH`]).
#[inline(always)]
pub(crate) fn valid_bits(len: usize) -> u64 {
    if len >= SCAN_WIDTH {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

mod scalar {
    use super::SCAN_WIDTH;

    #[inline(always)]
    pub fn mask(window: &[u8], needle: u8) -> u64 {
        let mut mask: u64 = 0;

        for (i, byte) in window[..SCAN_WIDTH].iter().enumerate() {
            mask |= ((*byte == needle) as u64) << i;
        }

        mask
    }
}

#[cfg(target_arch = "x86_64")]
mod x86_64 {
    pub mod sse2 {
        use core::arch::x86_64::{
            __m128i, _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi8,
        };

        #[inline(always)]
        unsafe fn lane(ptr: *const u8, v: __m128i) -> u64 {
            let chunk = _mm_loadu_si128(ptr as *const __m128i);
            (_mm_movemask_epi8(_mm_cmpeq_epi8(chunk, v)) as u32 & 0xffff) as u64
        }

        /// # Safety
        ///
        /// `ptr` must point to at least 64 readable bytes.
        #[inline]
        pub unsafe fn mask(ptr: *const u8, needle: u8) -> u64 {
            let v = _mm_set1_epi8(needle as i8);

            lane(ptr, v)
                | (lane(ptr.add(16), v) << 16)
                | (lane(ptr.add(32), v) << 32)
                | (lane(ptr.add(48), v) << 48)
        }
    }

    pub mod avx2 {
        use core::arch::x86_64::{
            __m256i, _mm256_cmpeq_epi8, _mm256_loadu_si256, _mm256_movemask_epi8,
            _mm256_set1_epi8,
        };

        /// # Safety
        ///
        /// `ptr` must point to at least 64 readable bytes and the running CPU
        /// must support `avx2`.
        #[target_feature(enable = "avx2")]
        pub unsafe fn mask(ptr: *const u8, needle: u8) -> u64 {
            let v = _mm256_set1_epi8(needle as i8);

            let lo = _mm256_loadu_si256(ptr as *const __m256i);
            let hi = _mm256_loadu_si256(ptr.add(32) as *const __m256i);

            let cmp_lo = _mm256_movemask_epi8(_mm256_cmpeq_epi8(lo, v)) as u32 as u64;
            let cmp_hi = _mm256_movemask_epi8(_mm256_cmpeq_epi8(hi, v)) as u32 as u64;

            cmp_lo | (cmp_hi << 32)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Scalar,
    #[cfg(target_arch = "x86_64")]
    Sse2,
    #[cfg(target_arch = "x86_64")]
    Avx2,
}

/// Returns the SIMD instructions set used by this crate's delimiter scanner
/// on the running CPU.
pub fn scanner_simd_instructions() -> &'static str {
    Scanner::new().instructions()
}

/// Computes 64-bit delimiter masks over 64-byte windows.
///
/// Bit `i` of a mask is set when byte `i` of the window equals the searched
/// byte. Every instruction set produces the exact same masks, the scalar one
/// included.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    level: Level,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    /// Create a scanner using the best instruction set available on the
    /// running CPU.
    pub fn new() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                return Self { level: Level::Avx2 };
            }

            Self { level: Level::Sse2 }
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            Self::scalar()
        }
    }

    /// Create a scanner that never uses SIMD instructions.
    pub fn scalar() -> Self {
        Self {
            level: Level::Scalar,
        }
    }

    /// Name of the instruction set used by this scanner.
    pub fn instructions(&self) -> &'static str {
        match self.level {
            Level::Scalar => "none",
            #[cfg(target_arch = "x86_64")]
            Level::Sse2 => "sse2",
            #[cfg(target_arch = "x86_64")]
            Level::Avx2 => "avx2",
        }
    }

    /// Returns the mask of positions equal to `needle` among the first
    /// [`SCAN_WIDTH`] bytes of `window`.
    ///
    /// Panics if `window` is shorter than [`SCAN_WIDTH`].
    #[inline(always)]
    pub fn mask(&self, window: &[u8], needle: u8) -> u64 {
        let window = &window[..SCAN_WIDTH];

        match self.level {
            Level::Scalar => scalar::mask(window, needle),
            #[cfg(target_arch = "x86_64")]
            Level::Sse2 => unsafe { x86_64::sse2::mask(window.as_ptr(), needle) },
            #[cfg(target_arch = "x86_64")]
            Level::Avx2 => unsafe { x86_64::avx2::mask(window.as_ptr(), needle) },
        }
    }

    /// Iterate over the offsets of `needle` among the first [`SCAN_WIDTH`]
    /// bytes of `window`, in ascending order.
    #[inline(always)]
    pub fn search(&self, window: &[u8], needle: u8) -> MaskIter {
        MaskIter::new(self.mask(window, needle))
    }
}

/// Iterator over the set bits of a delimiter mask, lowest first.
#[derive(Debug, Clone)]
pub struct MaskIter {
    mask: u64,
}

impl MaskIter {
    #[inline(always)]
    pub fn new(mask: u64) -> Self {
        Self { mask }
    }
}

impl Iterator for MaskIter {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        let offset = lowest_set_bit(self.mask)?;
        self.mask = clear_least_significant_bit(self.mask);

        Some(offset)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.mask.count_ones() as usize;

        (size, Some(size))
    }
}

impl ExactSizeIterator for MaskIter {}
impl FusedIterator for MaskIter {}
