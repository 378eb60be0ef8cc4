//! # lesp GATT boundary
//!
//! The link-layer seam for the LE serial port. The attribute-protocol stack
//! itself (connection establishment, MTU negotiation, notification delivery)
//! lives outside this workspace; everything the core needs from it is
//! expressed here:
//!
//! - [`GattLink`] - the outbound half: addressed `send`/`write` and `notify`
//!   primitives that may accept fewer bytes than offered or reject a call
//!   outright when the stack's outbound queue is full.
//! - [`LinkEvent`] - the inbound half: the serialized callback stream the
//!   stack delivers (connect, disconnect, received data, queue-drained).
//! - [`mtu`] - ATT MTU limits and the per-notification payload budget.
//! - [`LoopbackLink`] - a deterministic in-memory link with scriptable
//!   acceptance, used by the test suites to replay backpressure sequences.
//!
//! ## Delivery model
//!
//! The stack delivers events one at a time per connection and never
//! re-enters a handler. Implementations of [`GattLink`] must not block:
//! a send that cannot complete immediately returns
//! [`LinkError::BufferFull`] and the stack later reports
//! [`LinkEvent::LinkBufferDrained`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod event;
pub mod link;
pub mod loopback;
pub mod mtu;

pub use event::{LinkEvent, PeerAddress};
pub use link::{Attribute, ConnId, GattLink, LinkError, Role};
pub use loopback::{LoopbackLink, SendRuling, SentRecord};
pub use mtu::{
    ATT_HEADER_LEN, DEFAULT_ATT_MTU, MAX_ATT_MTU, MAX_PAYLOAD_BUDGET, MIN_ATT_MTU, payload_budget,
};
