#![no_main]

use libfuzzer_sys::fuzz_target;

use fastcsv::{ByteBuffer, GzipBuffer};

fuzz_target!(|data: &[u8]| {
    let mut buffer = GzipBuffer::with_capacity(16, 64, 32, data);

    while let Ok(produced) = buffer.refill(buffer.end()) {
        if produced == 0 {
            break;
        }
    }
});
