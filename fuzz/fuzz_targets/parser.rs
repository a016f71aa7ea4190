#![no_main]

use libfuzzer_sys::fuzz_target;

use fastcsv::{Compression, RowParserBuilder};

fuzz_target!(|data: &[u8]| {
    let mut parser = RowParserBuilder::new()
        .compression(Compression::None)
        .max_columns(16)
        .max_row_len(128)
        .buffer_capacity(64)
        .from_reader(data)
        .unwrap();

    let mut len = 0;

    while let Ok(Some(row)) = parser.read_row() {
        len += row.as_slice().len();
    }

    assert!(len <= data.len());
});
