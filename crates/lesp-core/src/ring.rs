//! Fixed-capacity byte ring buffer.
//!
//! The building block under both directions of the port: the transmit
//! buffer absorbs bytes awaiting credits and the receive buffer holds
//! bytes awaiting the application. Writes and reads never fail - they
//! return a short count when space or data runs out - and the free count
//! is kept explicit rather than derived so the accounting the flow
//! controller reads is always a single load.
//!
//! Single-threaded by design: every buffer is owned by one session and
//! touched only from that connection's serialized event handlers.

use thiserror::Error;

/// Attempt to push back more bytes than were read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unread of {requested} bytes exceeds reclaimable space {reclaimable}")]
pub struct UnreadError {
    /// Bytes the caller tried to push back.
    pub requested: usize,
    /// Bytes that could have been pushed back.
    pub reclaimable: usize,
}

/// Byte ring buffer with explicit free-space accounting.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    write_cursor: usize,
    read_cursor: usize,
    free_count: usize,
}

impl RingBuffer {
    /// Create a buffer of exactly `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_cursor: 0,
            read_cursor: 0,
            free_count: capacity,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes of free space.
    #[must_use]
    pub fn free(&self) -> usize {
        self.free_count
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn used(&self) -> usize {
        self.buf.len() - self.free_count
    }

    /// Whether the buffer holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free_count == self.buf.len()
    }

    /// Whether the buffer has no free space.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_count == 0
    }

    /// Append as many of `bytes` as fit, returning how many were taken.
    ///
    /// Never blocks, never overflows; a full buffer returns 0.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free_count);
        if n == 0 {
            return 0;
        }

        let cap = self.buf.len();
        let first = n.min(cap - self.write_cursor);
        self.buf[self.write_cursor..self.write_cursor + first].copy_from_slice(&bytes[..first]);
        let second = n - first;
        if second > 0 {
            self.buf[..second].copy_from_slice(&bytes[first..n]);
        }

        self.write_cursor = (self.write_cursor + n) % cap;
        self.free_count -= n;
        n
    }

    /// Drain up to `out.len()` bytes into `out`, returning how many were
    /// copied. Reads are destructive.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.used());
        if n == 0 {
            return 0;
        }

        let cap = self.buf.len();
        let first = n.min(cap - self.read_cursor);
        out[..first].copy_from_slice(&self.buf[self.read_cursor..self.read_cursor + first]);
        let second = n - first;
        if second > 0 {
            out[first..n].copy_from_slice(&self.buf[..second]);
        }

        self.read_cursor = (self.read_cursor + n) % cap;
        self.free_count += n;
        n
    }

    /// Drain up to `max_len` bytes into a fresh vector.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.used())];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Reclaim the last `n` bytes read, restoring them at the front.
    ///
    /// Only valid directly after a read of at least `n` bytes with no
    /// intervening write: the bytes are still physically present ahead of
    /// the read cursor. Used by the drain loop to re-buffer a chunk the
    /// link refused or only partially accepted.
    ///
    /// # Errors
    ///
    /// [`UnreadError`] if `n` exceeds the reclaimable space.
    pub fn unread(&mut self, n: usize) -> Result<(), UnreadError> {
        if n > self.free_count {
            debug_assert!(false, "unread past reclaimable space");
            return Err(UnreadError {
                requested: n,
                reclaimable: self.free_count,
            });
        }
        let cap = self.buf.len();
        self.read_cursor = (self.read_cursor + cap - n) % cap;
        self.free_count -= n;
        Ok(())
    }

    /// Empty the buffer and rewind both cursors.
    pub fn reset(&mut self) {
        self.write_cursor = 0;
        self.read_cursor = 0;
        self.free_count = self.buf.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_write_when_nearly_full() {
        // Capacity 8: write 5, then 5 more - the second takes only 3.
        let mut rb = RingBuffer::new(8);
        assert_eq!(rb.write(b"aaaaa"), 5);
        assert_eq!(rb.write(b"bbbbb"), 3);
        assert!(rb.is_full());
        assert_eq!(rb.used(), 8);
        assert_eq!(rb.read(8), b"aaaaabbb");
    }

    #[test]
    fn roundtrip_preserves_bytes() {
        let mut rb = RingBuffer::new(16);
        assert_eq!(rb.write(b"hello world"), 11);
        assert_eq!(rb.read(11), b"hello world");
        assert!(rb.is_empty());
    }

    #[test]
    fn wraparound_roundtrip() {
        let mut rb = RingBuffer::new(8);
        // Advance the cursors past the middle, then wrap.
        assert_eq!(rb.write(b"xxxxxx"), 6);
        assert_eq!(rb.read(6), b"xxxxxx");
        assert_eq!(rb.write(b"abcdefgh"), 8);
        assert_eq!(rb.read(8), b"abcdefgh");
    }

    #[test]
    fn zero_length_ops_are_noops() {
        let mut rb = RingBuffer::new(4);
        assert_eq!(rb.write(b""), 0);
        assert_eq!(rb.read(0), b"");
        let mut out = [];
        assert_eq!(rb.read_into(&mut out), 0);
        assert_eq!(rb.used(), 0);
    }

    #[test]
    fn oversized_requests_bounded_by_capacity() {
        let mut rb = RingBuffer::new(4);
        let big = [0x5a; 64];
        assert_eq!(rb.write(&big), 4);
        let mut out = [0u8; 64];
        assert_eq!(rb.read_into(&mut out), 4);
        assert_eq!(&out[..4], &[0x5a; 4]);
    }

    #[test]
    fn read_into_partial_drain_keeps_order() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"abcdef");
        let mut out = [0u8; 2];
        assert_eq!(rb.read_into(&mut out), 2);
        assert_eq!(&out, b"ab");
        assert_eq!(rb.read(8), b"cdef");
    }

    #[test]
    fn unread_restores_front_order() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"abcdef");
        let mut out = [0u8; 4];
        assert_eq!(rb.read_into(&mut out), 4);
        // Push back the last 2 bytes of the read ("cd").
        rb.unread(2).unwrap();
        assert_eq!(rb.read(8), b"cdef");
    }

    #[test]
    fn unread_across_wrap() {
        let mut rb = RingBuffer::new(4);
        rb.write(b"ab");
        rb.read(2);
        rb.write(b"cdef"); // wraps
        let mut out = [0u8; 4];
        assert_eq!(rb.read_into(&mut out), 4);
        rb.unread(4).unwrap();
        assert_eq!(rb.read(4), b"cdef");
    }

    #[test]
    fn unread_past_reclaimable_fails() {
        let mut rb = RingBuffer::new(4);
        rb.write(b"abcd");
        // Nothing read yet, nothing reclaimable beyond free space (0).
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rb.unread(1)));
        // debug_assert fires in test builds; in release the Err is returned.
        if let Ok(res) = err {
            assert!(res.is_err());
        }
    }

    #[test]
    fn reset_empties() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"abc");
        rb.reset();
        assert!(rb.is_empty());
        assert_eq!(rb.free(), 8);
        assert_eq!(rb.write(b"xyz"), 3);
        assert_eq!(rb.read(3), b"xyz");
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }
}
