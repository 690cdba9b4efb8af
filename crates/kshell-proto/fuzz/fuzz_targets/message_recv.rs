#![no_main]

use libfuzzer_sys::fuzz_target;
use kshell_proto::{Message, Protocol};

fuzz_target!(|data: &[u8]| {
    // Must not panic or over-allocate on any byte sequence. Errors are fine.
    let proto = Protocol::new(0xC0FFEE01, 1, 0).with_max_len(1 << 20);
    let mut cursor = data;
    while let Ok(msg) = Message::recv(&mut cursor, &proto) {
        let _ = msg.to_bytes();
    }
});
