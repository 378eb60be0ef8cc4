//! Credit-based flow-controlled serial streams over a GATT link.
//!
//! The crate emulates a classic serial port on top of two GATT
//! attributes: one carries raw stream bytes, the other a running credit
//! counter. Each credit is permission to send one byte; a receiver
//! grants credits as its application drains the receive buffer, so a
//! slow reader throttles the sender without ever dropping stream bytes
//! in flight.
//!
//! ```text
//!   application            TransportEngine                 GattLink
//!   -----------            ---------------                 --------
//!   submit_send --------> [tx ring] --drain loop--------->  Data
//!                           ^   credits consumed per byte
//!   poll_received <------ [rx ring] <---------------------  Data
//!                           |   freed space owed to peer
//!                           +-- credit ledger ----------->  Credits
//! ```
//!
//! [`TransportEngine`] is the entry point. It is single-threaded by
//! construction: the stack serializes its callbacks, so there are no
//! locks or atomics anywhere in the crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod config;
pub mod credit;
pub mod engine;
pub mod error;
pub mod registry;
pub mod ring;
pub mod session;

pub use config::PortConfig;
pub use credit::{CREDIT_MSG_LEN, CreditLedger, decode_credits, encode_credits};
pub use engine::{SendOutcome, TransportEngine};
pub use error::{EngineError, ProtocolError};
pub use registry::{DisconnectOutcome, SessionRegistry};
pub use ring::RingBuffer;
pub use session::{ConnectionStatus, EngineState, PendingSend, Session, SessionStats};
