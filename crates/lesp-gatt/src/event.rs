//! Inbound events delivered by the attribute-protocol stack.
//!
//! The stack drives the transport entirely through this tagged event enum,
//! dispatched into a single handler entry point per component. Events for
//! one connection are serialized and never delivered re-entrantly.

use crate::link::{Attribute, ConnId, Role};
use serde::{Deserialize, Serialize};

/// Stable peer identity: the 6-byte device address.
///
/// Survives reconnects, unlike [`ConnId`]. Used as the bonding-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(pub [u8; 6]);

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Big-endian colon form, the way controllers print it.
        let b = &self.0;
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            hex::encode_upper([b[0]]),
            hex::encode_upper([b[1]]),
            hex::encode_upper([b[2]]),
            hex::encode_upper([b[3]]),
            hex::encode_upper([b[4]]),
            hex::encode_upper([b[5]]),
        )
    }
}

/// Events the stack delivers to the transport core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection reached the attribute layer.
    Connected {
        /// Stable peer identity.
        peer: PeerAddress,
        /// Stack handle for this connection.
        conn: ConnId,
        /// Which stream endpoint this side plays.
        role: Role,
        /// Negotiated ATT MTU for the connection.
        att_mtu: u16,
    },
    /// The connection dropped. Implicitly cancels all in-flight sends and
    /// credit accounting for the handle.
    Disconnected {
        /// Stable peer identity.
        peer: PeerAddress,
        /// Stack handle that just died.
        conn: ConnId,
    },
    /// Payload arrived on one of the serial-port attributes.
    DataReceived {
        /// Connection it arrived on.
        conn: ConnId,
        /// Attribute it was addressed to.
        attribute: Attribute,
        /// Raw payload bytes.
        bytes: Vec<u8>,
    },
    /// The peer toggled the subscription (CCCD) for an attribute.
    SubscriptionChanged {
        /// Connection the toggle applies to.
        conn: ConnId,
        /// Attribute subscribed or unsubscribed.
        attribute: Attribute,
        /// New subscription state.
        enabled: bool,
    },
    /// The stack's outbound queue has space again. Clears the
    /// backpressure flag shared by the data and credit paths.
    LinkBufferDrained {
        /// Connection whose queue drained.
        conn: ConnId,
    },
    /// Acknowledgement of an attribute write. Only consumed to retry the
    /// initial credit bootstrap.
    WriteResponse {
        /// Connection the response belongs to.
        conn: ConnId,
    },
    /// Completion of an attribute read. Only consumed to retry the
    /// initial credit bootstrap.
    ReadResponse {
        /// Connection the response belongs to.
        conn: ConnId,
        /// Attribute value read.
        bytes: Vec<u8>,
    },
}
