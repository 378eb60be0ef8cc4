//! The outbound link trait and its addressing types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque per-connection handle issued by the attribute-protocol stack.
///
/// Valid only for the lifetime of one connection; a reconnecting peer may
/// come back under a different handle. Stable identity is the
/// [`PeerAddress`](crate::event::PeerAddress).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub u16);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{:04x}", self.0)
    }
}

/// Which of the serial-port attributes a payload is addressed to.
///
/// The emulated port uses one attribute pair per direction: a stream-data
/// attribute carrying raw bytes and a credit attribute carrying the 2-byte
/// flow-control counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// Stream payload bytes.
    Data,
    /// Flow-control credit counter.
    Credits,
}

/// Which end of the emulated serial port this side plays.
///
/// Decided by which side accepted the connection: the notifier pushes its
/// stream out as notifications, the writer pushes its stream out as
/// attribute writes. Both directions are flow-controlled the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// GATT server side: outbound data travels as notifications.
    StreamNotifier,
    /// GATT client side: outbound data travels as attribute writes.
    StreamWriter,
}

/// Failures the link can report for a single outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The stack's outbound queue has no room. Recoverable: retry after
    /// [`LinkEvent::LinkBufferDrained`](crate::event::LinkEvent::LinkBufferDrained).
    #[error("link outbound buffer full")]
    BufferFull,

    /// The peer has not enabled notifications/indications for this
    /// attribute yet.
    #[error("peer not subscribed to {0:?} attribute")]
    NotSubscribed(Attribute),

    /// The handle does not name a live connection.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    /// Any other stack-level send failure. Not recoverable for the bytes
    /// in flight.
    #[error("link send failed: {0}")]
    Failed(String),
}

/// The outbound half of the attribute-protocol stack.
///
/// Both methods share one contract: they either accept a prefix of the
/// payload (returning how many bytes the stack queued) or fail without
/// consuming anything. `Ok(n)` with `n < bytes.len()` is a legal partial
/// acceptance; the caller owns the remainder.
///
/// Implementations must not block. All calls for one connection happen
/// from within that connection's serialized event handlers.
pub trait GattLink {
    /// Write `bytes` to `attribute` on the peer (client role).
    fn send(&mut self, conn: ConnId, attribute: Attribute, bytes: &[u8])
    -> Result<usize, LinkError>;

    /// Notify `bytes` from `attribute` to the peer (server role).
    fn notify(
        &mut self,
        conn: ConnId,
        attribute: Attribute,
        bytes: &[u8],
    ) -> Result<usize, LinkError>;
}
