//! # lesp security
//!
//! Per-connection pairing/bonding state machine. The cryptographic
//! handshake itself belongs to the controller stack; this crate only
//! sequences the states the transport cares about and holds the long-term
//! key between connections. The transport consumes exactly two outputs:
//!
//! - `link_encrypted` - whether stream data may flow, and
//! - bonding-key presence - whether a session survives disconnect.
//!
//! ```text
//! Unauthenticated ──► PairingInProgress ──► Paired
//!                              │               │  reconnect
//!                              ▼               ▼
//!                           Failed ◄─── Reestablishing
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod error;
pub mod pairing;

pub use error::SecurityError;
pub use pairing::{BondingKey, PairingMachine, PairingState, SecurityEvent};
