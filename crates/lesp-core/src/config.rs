//! Port configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the emulated serial port.
///
/// One instance configures the whole engine; buffers are allocated per
/// connection at these sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Transmit buffer capacity per connection (bytes awaiting credits).
    pub tx_buffer_capacity: usize,

    /// Receive buffer capacity per connection. Also the upper bound on
    /// credits ever outstanding to the peer.
    pub rx_buffer_capacity: usize,

    /// Maximum simultaneous (or bonded-and-remembered) peers.
    pub max_connections: usize,

    /// Cap on a single credit message's value. The wire field is 16 bits
    /// regardless; lowering this spreads grants over more messages.
    pub max_credit_message: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            tx_buffer_capacity: 1024,
            rx_buffer_capacity: 1024,
            max_connections: 4,
            max_credit_message: u16::MAX,
        }
    }
}
