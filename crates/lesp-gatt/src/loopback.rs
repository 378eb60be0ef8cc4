//! Deterministic in-memory link for tests and harnesses.
//!
//! [`LoopbackLink`] records every accepted payload and lets a test script
//! the outcome of each outbound call ahead of time: full acceptance,
//! partial acceptance, a buffer-full rejection, or a hard failure. After a
//! buffer-full rejection the link stays backpressured (every further call
//! rejects) until [`LoopbackLink::drain`] is called, matching how a real
//! stack's outbound queue behaves between the rejection and its
//! queue-drained callback.

use crate::link::{Attribute, ConnId, GattLink, LinkError};
use std::collections::{HashSet, VecDeque};

/// Scripted outcome for one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRuling {
    /// Accept the whole payload.
    Accept,
    /// Accept at most this many bytes.
    AcceptPartial(usize),
    /// Reject with [`LinkError::BufferFull`] and enter backpressure.
    RejectBufferFull,
    /// Fail with [`LinkError::Failed`].
    Fail(&'static str),
}

/// One accepted outbound payload, as the wire would have carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    /// Connection the payload left on.
    pub conn: ConnId,
    /// Attribute it was addressed to.
    pub attribute: Attribute,
    /// The accepted prefix of the offered bytes.
    pub bytes: Vec<u8>,
}

/// In-memory [`GattLink`] with scriptable acceptance.
#[derive(Debug, Default)]
pub struct LoopbackLink {
    connected: HashSet<ConnId>,
    subscriptions: HashSet<(ConnId, Attribute)>,
    rulings: VecDeque<SendRuling>,
    sent: Vec<SentRecord>,
    backpressured: bool,
}

impl LoopbackLink {
    /// Create an empty link with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection handle.
    pub fn connect(&mut self, conn: ConnId) {
        self.connected.insert(conn);
    }

    /// Drop a connection handle and its subscriptions.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.connected.remove(&conn);
        self.subscriptions.retain(|(c, _)| *c != conn);
    }

    /// Mark the peer as subscribed to an attribute's notifications.
    pub fn subscribe(&mut self, conn: ConnId, attribute: Attribute) {
        self.subscriptions.insert((conn, attribute));
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, conn: ConnId, attribute: Attribute) {
        self.subscriptions.remove(&(conn, attribute));
    }

    /// Queue the outcome for the next unscripted outbound call.
    pub fn script(&mut self, ruling: SendRuling) {
        self.rulings.push_back(ruling);
    }

    /// Clear backpressure, as a stack does right before its queue-drained
    /// callback. The caller still delivers `LinkEvent::LinkBufferDrained`.
    pub fn drain(&mut self) {
        self.backpressured = false;
    }

    /// Whether the link is currently rejecting for lack of queue space.
    #[must_use]
    pub fn is_backpressured(&self) -> bool {
        self.backpressured
    }

    /// Accepted payloads so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> &[SentRecord] {
        &self.sent
    }

    /// Take and clear the accepted-payload log.
    pub fn take_sent(&mut self) -> Vec<SentRecord> {
        std::mem::take(&mut self.sent)
    }

    fn transmit(
        &mut self,
        conn: ConnId,
        attribute: Attribute,
        bytes: &[u8],
    ) -> Result<usize, LinkError> {
        if !self.connected.contains(&conn) {
            return Err(LinkError::UnknownConnection(conn));
        }

        let ruling = self.rulings.pop_front().unwrap_or(SendRuling::Accept);
        if self.backpressured && ruling == SendRuling::Accept {
            // Unscripted calls keep rejecting until drained.
            return Err(LinkError::BufferFull);
        }

        match ruling {
            SendRuling::Accept => {
                self.record(conn, attribute, bytes);
                Ok(bytes.len())
            }
            SendRuling::AcceptPartial(n) => {
                let accepted = n.min(bytes.len());
                self.record(conn, attribute, &bytes[..accepted]);
                Ok(accepted)
            }
            SendRuling::RejectBufferFull => {
                self.backpressured = true;
                tracing::debug!(%conn, ?attribute, "loopback: outbound queue full");
                Err(LinkError::BufferFull)
            }
            SendRuling::Fail(reason) => Err(LinkError::Failed(reason.to_string())),
        }
    }

    fn record(&mut self, conn: ConnId, attribute: Attribute, accepted: &[u8]) {
        self.sent.push(SentRecord {
            conn,
            attribute,
            bytes: accepted.to_vec(),
        });
    }
}

impl GattLink for LoopbackLink {
    fn send(
        &mut self,
        conn: ConnId,
        attribute: Attribute,
        bytes: &[u8],
    ) -> Result<usize, LinkError> {
        self.transmit(conn, attribute, bytes)
    }

    fn notify(
        &mut self,
        conn: ConnId,
        attribute: Attribute,
        bytes: &[u8],
    ) -> Result<usize, LinkError> {
        if !self.subscriptions.contains(&(conn, attribute)) {
            return Err(LinkError::NotSubscribed(attribute));
        }
        self.transmit(conn, attribute, bytes)
    }
}
