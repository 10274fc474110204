//! Fuzz target: `LineDecoder::feed` + `split_frame`
//!
//! Drives arbitrary byte sequences into the streaming line decoder and
//! asserts that it never panics, never yields a line over the limit, and
//! produces the same lines whether the input arrives whole or byte by byte.
//!
//! cargo fuzz run fuzz_line_decoder

#![no_main]

use arctic_link::link::codec::{split_frame, LineDecoder, MAX_LINE_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    let mut decoder = LineDecoder::new();
    decoder.feed(data, |line| {
        assert!(line.len() <= MAX_LINE_LEN, "line exceeds MAX_LINE_LEN");
        assert!(!line.contains(&b'\n'));
        if let Some(frame) = split_frame(line) {
            assert!(frame.id.len() <= 36);
        }
        whole.push(line.to_vec());
    });

    let mut bytewise = Vec::new();
    let mut decoder = LineDecoder::new();
    for b in data {
        decoder.feed(core::slice::from_ref(b), |line| bytewise.push(line.to_vec()));
    }
    assert_eq!(whole, bytewise);

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    assert_eq!(decoder.pending(), 0);
    decoder.feed(data, |_| {});
});
