//! Credit ledger and the credit-message wire form.
//!
//! One ledger per connection tracks both directions of the byte-credit
//! protocol: `tx_credits` is permission to transmit granted by the peer,
//! `rx_free_advertised` is receive-buffer space freed locally but not yet
//! granted to the peer, and `rx_credit_pending` holds grants that were
//! computed but could not be delivered because the link was backpressured.
//! Pending credits are flushed exactly once when backpressure clears.
//!
//! All arithmetic is checked: an underflow means the engine double-counted
//! and is surfaced as an invariant violation instead of wrapping.

use crate::error::{EngineError, ProtocolError};

/// Fixed length of a credit notification payload.
pub const CREDIT_MSG_LEN: usize = 2;

/// Encode a credit grant as the 2-byte little-endian attribute payload.
#[must_use]
pub fn encode_credits(credits: u16) -> [u8; CREDIT_MSG_LEN] {
    credits.to_le_bytes()
}

/// Decode a credit notification payload.
///
/// # Errors
///
/// [`ProtocolError::BadCreditLength`] if the payload is not exactly
/// [`CREDIT_MSG_LEN`] bytes.
pub fn decode_credits(payload: &[u8]) -> Result<u16, ProtocolError> {
    let bytes: [u8; CREDIT_MSG_LEN] = payload
        .try_into()
        .map_err(|_| ProtocolError::BadCreditLength(payload.len()))?;
    Ok(u16::from_le_bytes(bytes))
}

/// Per-connection flow-control accounting.
#[derive(Debug, Default)]
pub struct CreditLedger {
    tx_credits: usize,
    rx_free_advertised: usize,
    rx_credit_pending: usize,
    /// Cumulative credits ever granted to us by the peer.
    tx_granted_total: u64,
    /// Cumulative bytes we actually put on the link.
    tx_consumed_total: u64,
}

impl CreditLedger {
    /// Fresh ledger with nothing granted in either direction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a (re)connection: no transmit credits, the whole (empty)
    /// receive buffer owed to the peer as the bootstrap grant.
    pub fn reset_for_connect(&mut self, rx_capacity: usize) {
        *self = Self {
            rx_free_advertised: rx_capacity,
            ..Self::default()
        };
    }

    /// Bytes this side may still transmit.
    #[must_use]
    pub fn tx_credits(&self) -> usize {
        self.tx_credits
    }

    /// Receive-buffer bytes freed locally but not yet granted.
    #[must_use]
    pub fn rx_free_advertised(&self) -> usize {
        self.rx_free_advertised
    }

    /// Grants computed but undelivered due to link backpressure.
    #[must_use]
    pub fn rx_credit_pending(&self) -> usize {
        self.rx_credit_pending
    }

    /// Cumulative credits granted by the peer.
    #[must_use]
    pub fn tx_granted_total(&self) -> u64 {
        self.tx_granted_total
    }

    /// Cumulative bytes sent on the link.
    #[must_use]
    pub fn tx_consumed_total(&self) -> u64 {
        self.tx_consumed_total
    }

    /// The peer granted `n` more bytes of transmit credit.
    pub fn grant_tx(&mut self, n: usize) {
        self.tx_credits += n;
        self.tx_granted_total += n as u64;
    }

    /// The link accepted `n` bytes of stream data.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvariantViolation`] if `n` exceeds the credits on
    /// hand - the link accepted more than it was offered.
    pub fn consume_tx(&mut self, n: usize) -> Result<(), EngineError> {
        if n > self.tx_credits {
            debug_assert!(false, "tx credit underflow");
            return Err(EngineError::InvariantViolation("tx credit underflow"));
        }
        self.tx_credits -= n;
        self.tx_consumed_total += n as u64;
        Ok(())
    }

    /// The application drained `n` bytes from the receive buffer; that
    /// space is now owed to the peer.
    pub fn on_rx_freed(&mut self, n: usize) {
        self.rx_free_advertised += n;
    }

    /// Size of the next credit message, bounded by the receive capacity,
    /// the configured cap, and the 2-byte wire field. 0 means nothing to
    /// send.
    #[must_use]
    pub fn emittable(&self, rx_capacity: usize, cap: u16) -> u16 {
        let amount = (self.rx_free_advertised + self.rx_credit_pending)
            .min(rx_capacity)
            .min(cap as usize);
        u16::try_from(amount).unwrap_or(u16::MAX)
    }

    /// A credit message for `amount` was accepted by the link.
    ///
    /// Consumes pending grants first, then freshly freed space.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvariantViolation`] if `amount` exceeds the grants
    /// on the books.
    pub fn mark_emitted(&mut self, amount: u16) -> Result<(), EngineError> {
        let mut remaining = amount as usize;
        let from_pending = remaining.min(self.rx_credit_pending);
        self.rx_credit_pending -= from_pending;
        remaining -= from_pending;
        if remaining > self.rx_free_advertised {
            debug_assert!(false, "rx credit over-emission");
            return Err(EngineError::InvariantViolation("rx credit over-emission"));
        }
        self.rx_free_advertised -= remaining;
        Ok(())
    }

    /// The link rejected the credit message; park the freshly freed space
    /// with the pending grants until backpressure clears.
    pub fn defer_emission(&mut self) {
        self.rx_credit_pending += self.rx_free_advertised;
        self.rx_free_advertised = 0;
    }
}
