//! Per-connection session state.
//!
//! A [`Session`] owns everything one peer's stream needs: the transmit and
//! receive ring buffers, the credit ledger, the shared link-backpressure
//! flag, and the pairing machine. Live-link fields are reset on every
//! (re)connection; the bonding key inside the pairing machine is the only
//! state that survives a disconnect.

use crate::config::PortConfig;
use crate::credit::CreditLedger;
use crate::ring::RingBuffer;
use lesp_gatt::{ConnId, DEFAULT_ATT_MTU, PeerAddress, Role};
use lesp_security::PairingMachine;
use serde::Serialize;

/// Transport-engine state for one connection, derived from session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Nothing queued, nothing stalled.
    Idle,
    /// Data queued and deliverable as soon as the drain loop runs.
    Sending,
    /// Data queued but the peer has granted no credits.
    CreditStarved,
    /// The stack's outbound queue rejected the last send; waiting for the
    /// queue-drained signal. Stalls both data and credit emission.
    LinkBackpressured,
}

/// A send request that could not be fully flushed in one call.
///
/// Created when bytes are left buffered, destroyed when the buffer
/// drains. Purely observability; the buffered bytes themselves live in
/// the transmit ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingSend {
    /// Bytes admitted across the submits this entry covers.
    pub total_requested: usize,
    /// Bytes of those already accepted by the link.
    pub bytes_sent: usize,
}

/// Monotonic per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Bytes admitted by `submit_send` (sent or buffered).
    pub bytes_queued: u64,
    /// Stream bytes the link accepted.
    pub bytes_sent_on_link: u64,
    /// Stream bytes received from the peer.
    pub bytes_received: u64,
    /// Credit messages delivered to the peer.
    pub credit_messages_sent: u64,
    /// Credit messages received from the peer.
    pub credit_messages_received: u64,
    /// Received bytes dropped because the application lagged.
    pub rx_bytes_dropped: u64,
}

/// Read-only snapshot of one connection, for embedders.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Stable peer identity.
    pub peer: PeerAddress,
    /// Derived engine state.
    pub state: EngineState,
    /// Stream endpoint role.
    pub role: Role,
    /// Whether the link is encrypted.
    pub link_encrypted: bool,
    /// Whether a bonding key is stored.
    pub bonded: bool,
    /// Transmit credits on hand.
    pub tx_credits: usize,
    /// Bytes waiting in the transmit buffer.
    pub tx_buffered: usize,
    /// Whether the transmit buffer is full.
    pub tx_buffer_full: bool,
    /// Bytes waiting for the application in the receive buffer.
    pub rx_buffered: usize,
    /// Whether the receive buffer is full.
    pub rx_buffer_full: bool,
    /// The shared outbound-queue backpressure flag.
    pub link_buffer_full: bool,
    /// In-flight send progress, if a send is queued.
    pub pending_send: Option<PendingSend>,
    /// Monotonic counters.
    pub stats: SessionStats,
}

/// State for one peer, live or bonded-and-disconnected.
#[derive(Debug)]
pub struct Session {
    pub(crate) peer: PeerAddress,
    /// Stack handle while connected.
    pub(crate) conn: Option<ConnId>,
    pub(crate) role: Role,
    pub(crate) att_mtu: u16,
    pub(crate) subscribed_data: bool,
    pub(crate) subscribed_credits: bool,
    /// One flag for the link's single outbound queue, consulted by both
    /// the transmit drain and credit emission.
    pub(crate) link_buffer_full: bool,
    pub(crate) tx_buffer: RingBuffer,
    pub(crate) rx_buffer: RingBuffer,
    pub(crate) credits: CreditLedger,
    pub(crate) pending_send: Option<PendingSend>,
    pub(crate) security: PairingMachine,
    pub(crate) stats: SessionStats,
}

impl Session {
    /// Allocate session state for a peer. Live-link fields stay inert
    /// until [`Session::on_connect`].
    #[must_use]
    pub fn new(peer: PeerAddress, config: &PortConfig) -> Self {
        Self {
            peer,
            conn: None,
            role: Role::StreamNotifier,
            att_mtu: DEFAULT_ATT_MTU,
            subscribed_data: false,
            subscribed_credits: false,
            link_buffer_full: false,
            tx_buffer: RingBuffer::new(config.tx_buffer_capacity),
            rx_buffer: RingBuffer::new(config.rx_buffer_capacity),
            credits: CreditLedger::new(),
            pending_send: None,
            security: PairingMachine::new(),
            stats: SessionStats::default(),
        }
    }

    /// Reset live-link fields for a (re)connection. The bonding key and
    /// the lifetime counters survive; everything tied to the old link is
    /// zeroed.
    pub fn on_connect(&mut self, conn: ConnId, role: Role, att_mtu: u16) {
        self.conn = Some(conn);
        self.role = role;
        self.att_mtu = att_mtu;
        self.subscribed_data = false;
        self.subscribed_credits = false;
        self.link_buffer_full = false;
        self.tx_buffer.reset();
        self.rx_buffer.reset();
        self.credits.reset_for_connect(self.rx_buffer.capacity());
        self.pending_send = None;
        self.security.reset_link();
    }

    /// Tear down connection-scoped state. Partially sent data is
    /// discarded, not requeued; the key (if any) is kept.
    pub fn on_disconnect(&mut self) {
        self.conn = None;
        self.subscribed_data = false;
        self.subscribed_credits = false;
        self.link_buffer_full = false;
        self.tx_buffer.reset();
        self.rx_buffer.reset();
        self.credits.reset_for_connect(self.rx_buffer.capacity());
        self.pending_send = None;
        self.security.reset_link();
    }

    /// Stable peer identity.
    #[must_use]
    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    /// Stack handle, while connected.
    #[must_use]
    pub fn conn(&self) -> Option<ConnId> {
        self.conn
    }

    /// Stream endpoint role for the current connection.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether a link is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether a bonding key is stored.
    #[must_use]
    pub fn is_bonded(&self) -> bool {
        self.security.has_bond()
    }

    /// The pairing machine for this peer.
    #[must_use]
    pub fn security(&self) -> &PairingMachine {
        &self.security
    }

    /// Monotonic counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Four-state view of the drain loop, derived from session fields.
    #[must_use]
    pub fn engine_state(&self) -> EngineState {
        if self.link_buffer_full {
            EngineState::LinkBackpressured
        } else if self.tx_buffer.is_empty() {
            EngineState::Idle
        } else if self.credits.tx_credits() == 0 {
            EngineState::CreditStarved
        } else {
            EngineState::Sending
        }
    }

    /// Snapshot for `connection_status`.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            peer: self.peer,
            state: self.engine_state(),
            role: self.role,
            link_encrypted: self.security.link_encrypted(),
            bonded: self.security.has_bond(),
            tx_credits: self.credits.tx_credits(),
            tx_buffered: self.tx_buffer.used(),
            tx_buffer_full: self.tx_buffer.is_full(),
            rx_buffered: self.rx_buffer.used(),
            rx_buffer_full: self.rx_buffer.is_full(),
            link_buffer_full: self.link_buffer_full,
            pending_send: self.pending_send,
            stats: self.stats,
        }
    }
}
