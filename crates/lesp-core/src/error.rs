//! Error types for the transport core.
//!
//! The taxonomy separates conditions by how the engine reacts:
//! backpressure and credit exhaustion are not errors at all (they stall the
//! drain loop and never appear here); [`ProtocolError`]s are logged and the
//! connection stays usable; [`EngineError::ReceiveOverflow`] reports bytes
//! the application failed to drain in time; everything else aborts the
//! operation that raised it but leaves the connection open.

use lesp_gatt::{ConnId, LinkError, PeerAddress};
use lesp_security::SecurityError;
use thiserror::Error;

/// Recoverable protocol anomalies. Logged and ignored; the connection
/// remains usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A credit notification payload was not the fixed 2-byte form.
    #[error("credit notification has wrong length: expected 2, got {0}")]
    BadCreditLength(usize),

    /// A payload arrived for an attribute the port does not use.
    #[error("payload for unexpected attribute")]
    UnexpectedAttribute,
}

/// Transport engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A link-level send failed with something other than buffer-full.
    /// Aborts the current send; the connection stays open.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Malformed traffic from the peer. See [`ProtocolError`].
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The application did not drain the receive buffer fast enough;
    /// `dropped` bytes were discarded. The stream continues.
    #[error("receive buffer overflow: {dropped} bytes dropped")]
    ReceiveOverflow {
        /// Number of bytes that did not fit.
        dropped: usize,
    },

    /// The handle does not name a live session.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    /// The address does not name a known session.
    #[error("no session for peer {0}")]
    UnknownPeer(PeerAddress),

    /// All session slots are occupied.
    #[error("session table full ({0} slots)")]
    RegistryFull(usize),

    /// Pairing-machine misuse reported by the security layer.
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Credit or buffer accounting underflowed/overflowed. A defect, not
    /// a runtime condition; fails fast in development builds.
    #[error("accounting invariant violated: {0}")]
    InvariantViolation(&'static str),
}
