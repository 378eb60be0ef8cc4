//! Fuzz target for credit-message decoding
//!
//! The decoder must reject any payload that is not exactly two bytes
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lesp_core::{decode_credits, encode_credits};

fuzz_target!(|data: &[u8]| {
    if let Ok(credits) = decode_credits(data) {
        // A successful decode must round-trip.
        assert_eq!(encode_credits(credits).as_slice(), data);
    }
});
