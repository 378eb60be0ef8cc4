//! Fuzz target for ring-buffer operations
//!
//! Drives arbitrary interleavings of writes, reads, unreads, and resets
//! against a byte-queue model; occupancy and FIFO order must match.

#![no_main]

use arbitrary::Arbitrary;
use lesp_core::RingBuffer;
use libfuzzer_sys::fuzz_target;
use std::collections::VecDeque;

#[derive(Debug, Arbitrary)]
enum Op {
    Write(Vec<u8>),
    Read(u8),
    Unread(u8),
    Reset,
}

fuzz_target!(|ops: Vec<Op>| {
    const CAP: usize = 61; // odd, to stress wraparound
    let mut ring = RingBuffer::new(CAP);
    let mut model: VecDeque<u8> = VecDeque::new();
    let mut last_read: Vec<u8> = Vec::new();

    for op in ops {
        match op {
            Op::Write(bytes) => {
                let accepted = ring.write(&bytes);
                assert_eq!(accepted, bytes.len().min(CAP - model.len()));
                model.extend(&bytes[..accepted]);
                last_read.clear();
            }
            Op::Read(n) => {
                let got = ring.read(n as usize);
                let expected: Vec<u8> = (0..got.len())
                    .filter_map(|_| model.pop_front())
                    .collect();
                assert_eq!(got, expected);
                last_read = got;
            }
            Op::Unread(n) => {
                // Only valid directly after a read, for bytes just read.
                let n = (n as usize).min(last_read.len());
                ring.unread(n).unwrap();
                for &byte in last_read[last_read.len() - n..].iter().rev() {
                    model.push_front(byte);
                }
                last_read.clear();
            }
            Op::Reset => {
                ring.reset();
                model.clear();
                last_read.clear();
            }
        }
        assert_eq!(ring.used(), model.len());
        assert_eq!(ring.free(), CAP - model.len());
        assert_eq!(ring.is_empty(), model.is_empty());
    }
});
