use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, Range};

use crate::debug;

/// A view of a CSV row into a [`RowParser`](crate::RowParser) buffer.
///
/// The view borrows the parser, so it cannot outlive the next call to
/// [`RowParser::advance`](crate::RowParser::advance). Use
/// [`Row::to_byte_record`] to keep a row around.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    storage: &'a [u8],
    // Start offset of every column, followed by the offset right after the
    // terminating newline.
    columns: &'a [usize],
}

impl<'a> Row<'a> {
    #[inline]
    pub(crate) fn new(storage: &'a [u8], columns: &'a [usize]) -> Self {
        debug_assert!(columns.len() >= 2);

        Self { storage, columns }
    }

    /// Number of fields of the row. Cannot be less than 1.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.columns.len() - 1
    }

    /// Returns whether the row has no fields.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the row's bytes, delimiters and terminating newline included.
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        &self.storage[self.columns[0]..self.columns[self.len()]]
    }

    /// Returns the row's bytes, delimiters included but without the
    /// terminating newline.
    #[inline]
    pub fn as_raw(&self) -> &'a [u8] {
        let slice = self.as_slice();
        &slice[..slice.len() - 1]
    }

    #[inline(always)]
    fn resolve(&self, index: isize) -> Option<usize> {
        let len = self.len();

        let index = if index < 0 {
            len.checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };

        (index < len).then_some(index)
    }

    #[inline(always)]
    fn field(&self, index: usize) -> &'a [u8] {
        &self.storage[self.columns[index]..self.columns[index + 1] - 1]
    }

    /// Returns the nth field of the row, if it is not out-of-bounds.
    ///
    /// Negative indices count from the end of the row, `-1` being the last
    /// field.
    #[inline]
    pub fn get(&self, index: isize) -> Option<&'a [u8]> {
        self.resolve(index).map(|i| self.field(i))
    }

    /// Returns an iterator over the row's fields.
    #[inline]
    pub fn iter(&self) -> RowIter<'a> {
        RowIter {
            row: *self,
            current_forward: 0,
            current_backward: self.len(),
        }
    }

    /// Converts the row into a proper, owned [`ByteRecord`].
    #[inline]
    pub fn to_byte_record(&self) -> ByteRecord {
        self.iter().collect()
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Row(")?;
        f.debug_list()
            .entries(self.iter().map(debug::Bytes))
            .finish()?;
        write!(f, ")")?;
        Ok(())
    }
}

impl Index<isize> for Row<'_> {
    type Output = [u8];

    #[inline]
    fn index(&self, i: isize) -> &[u8] {
        match self.get(i) {
            Some(field) => field,
            None => panic!(
                "field index {} is out of bounds for a row of {} fields",
                i,
                self.len()
            ),
        }
    }
}

impl<'a> IntoIterator for Row<'a> {
    type IntoIter = RowIter<'a>;
    type Item = &'a [u8];

    #[inline]
    fn into_iter(self) -> RowIter<'a> {
        self.iter()
    }
}

pub struct RowIter<'a> {
    row: Row<'a>,
    current_forward: usize,
    current_backward: usize,
}

impl ExactSizeIterator for RowIter<'_> {}
impl FusedIterator for RowIter<'_> {}

impl<'a> Iterator for RowIter<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            let field = self.row.field(self.current_forward);

            self.current_forward += 1;

            Some(field)
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.current_backward - self.current_forward;

        (size, Some(size))
    }

    #[inline]
    fn count(self) -> usize
    where
        Self: Sized,
    {
        self.len()
    }
}

impl DoubleEndedIterator for RowIter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            self.current_backward -= 1;

            Some(self.row.field(self.current_backward))
        }
    }
}

/// An owned copy of a CSV row, as returned by [`Row::to_byte_record`].
///
/// Fields are stored back to back, delimited by their end offsets.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct ByteRecord {
    data: Vec<u8>,
    ends: Vec<usize>,
}

impl ByteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    #[inline(always)]
    fn field(&self, index: usize) -> &[u8] {
        let start = index.checked_sub(1).map_or(0, |i| self.ends[i]);

        &self.data[start..self.ends[index]]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        (index < self.len()).then(|| self.field(index))
    }

    #[inline]
    pub fn iter(&self) -> ByteRecordIter<'_> {
        ByteRecordIter {
            record: self,
            range: 0..self.len(),
        }
    }

    #[inline(always)]
    pub fn push_field(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.ends.push(self.data.len());
    }
}

impl<T: AsRef<[u8]>> Extend<T> for ByteRecord {
    #[inline]
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for field in iter {
            self.push_field(field.as_ref());
        }
    }
}

impl<T: AsRef<[u8]>> FromIterator<T> for ByteRecord {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut record = Self::new();
        record.extend(iter);
        record
    }
}

impl fmt::Debug for ByteRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ByteRecord(")?;
        f.debug_list()
            .entries(self.iter().map(debug::Bytes))
            .finish()?;
        write!(f, ")")
    }
}

pub struct ByteRecordIter<'a> {
    record: &'a ByteRecord,
    range: Range<usize>,
}

impl ExactSizeIterator for ByteRecordIter<'_> {}
impl FusedIterator for ByteRecordIter<'_> {}

impl<'a> Iterator for ByteRecordIter<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.range.next().map(|i| self.record.field(i))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl DoubleEndedIterator for ByteRecordIter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.range.next_back().map(|i| self.record.field(i))
    }
}
