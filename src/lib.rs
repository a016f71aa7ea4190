/*!
The `fastcsv` crate provides a streaming, zero-copy parser of simple CSV data
able to leverage [SIMD](https://en.wikipedia.org/wiki/Single_instruction,_multiple_data)
instructions, reading plain or gzip compressed files alike.

It is geared towards large machine-generated files where every row has the same
number of fields and no field is quoted: commas always separate fields and
newlines always separate rows.

# Examples

*Iterating over the rows of a file, compressed or not*

```
use fastcsv::RowParser;

let mut parser = RowParser::from_path("data.csv.gz")?;

while let Some(row) = parser.read_row()? {
    dbg!(&row[0], &row[-1]);
}
```

*Finding columns by name*

```
use fastcsv::RowParser;

let mut parser = RowParser::from_path("data.csv")?;
let indices = parser.header_indices(&["name", "age"])?;
```

*Using a builder to configure your parser*

```
use std::fs::File;
use fastcsv::{Compression, RowParserBuilder};

let mut parser = RowParserBuilder::new()
    .max_columns(2000)
    .max_row_len(1 << 20)
    .compression(Compression::Gzip)
    .from_reader(File::open("data.csv.gz")?)?;
```

# Rows

Rows returned by [`RowParser::row`] and [`RowParser::read_row`] are views into
the parser's buffer, so the borrow checker forbids keeping them across calls to
[`RowParser::advance`]. Convert them into an owned [`ByteRecord`] if needed, or
use [`RowParser::byte_records`].

Rows can be indexed from the end with negative indices, `-1` being the last
field.

# Errors

Every error is fatal: the parser is exhausted after returning one. This
includes rows whose number of fields differ from the first row, rows longer
than the configured maximum row length and a stream ending in the middle of a
row (i.e. lacking a final newline).

# Supported targets

- On `x86_64` targets, `sse2` instructions are used. `avx2` instructions
  will also be used if their availability is detected at runtime.
- Everywhere else, the library will fallback to a scalar implementation.

# Design notes

## Delimiter masks

The parser scans its buffer by windows of 64 bytes, computing a 64-bit mask of
newline positions for each one. While no newline is found, a mask of comma
positions is computed as well and consumed bit by bit, so that branching happens
on each field rather than on each byte. The window containing the newline is
rescanned for commas linearly, up to the newline.

The buffer always keeps 64 addressable bytes after its resident data so that
windows never read out of bounds. Bytes past the end of the resident data are
masked out.

## Buffer compaction

When less than a maximum row length is resident after the current position,
the parser asks its buffer to move the current row to the front of its storage
and to append fresh bytes after it. This is why rows longer than the maximum row
length cannot be parsed.

## Gzip streams

Compressed data is inflated into a 32 KiB circular dictionary before being
copied into the parser's buffer, so that deflate back-references can reach bytes
already handed out. Concatenated members are read one after the other, each
footer being checked against the decompressed length and CRC-32.
*/
#[allow(unused_macros)]
macro_rules! brec {
    () => {{
        $crate::records::ByteRecord::new()
    }};

    ($($x: expr),*) => {{
        let mut r = $crate::records::ByteRecord::new();

        $(
            r.push_field($x.as_bytes());
        )*

        r
    }};
}

mod buffer;
mod debug;
mod error;
mod gzip;
mod inflate;
mod parser;
mod records;
mod scanner;
mod source;

pub use buffer::{ByteBuffer, RawBuffer};
pub use error::{Error, ErrorKind, Result};
pub use gzip::GzipBuffer;
pub use inflate::{DeflateWindow, InflateProgress, DICT_SIZE};
pub use parser::{ByteRecordsIter, RowParser, RowParserBuilder};
pub use records::{ByteRecord, ByteRecordIter, Row, RowIter};
pub use scanner::{lowest_set_bit, scanner_simd_instructions, MaskIter, Scanner, SCAN_WIDTH};
pub use source::Compression;
