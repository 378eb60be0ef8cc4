//! The transport engine: credit-governed drain loop, receive path, and
//! credit emission.
//!
//! One engine owns the link and the session registry and reacts to the
//! four external stimuli: a send request from the application, received
//! data, a received credit grant, and the link's queue-drained signal.
//! Everything runs inside the stack's serialized callbacks; no call here
//! blocks or re-enters.
//!
//! # The drain loop
//!
//! While credits remain, the link is not backpressured, and data is
//! waiting, the loop takes `min(tx_credits, mtu_budget, available)` bytes
//! (already-buffered bytes first, then the caller's fresh bytes), offers
//! them to the link once, and settles the outcome:
//!
//! - full acceptance: consume credits, continue;
//! - short acceptance: consume what was taken, put the rest back at the
//!   front of the transmit buffer, stop (no spinning);
//! - buffer-full: put the whole chunk back, raise the shared
//!   backpressure flag, stop - recoverable, retried on the drain signal;
//! - any other link error: abort the current send, clear its accounting,
//!   surface the error; the connection stays open.
//!
//! Fresh bytes the loop never reached are absorbed into the transmit
//! buffer so nothing is silently lost; bytes that fit nowhere are
//! reported back to the caller as rejected.

use crate::config::PortConfig;
use crate::credit::{decode_credits, encode_credits};
use crate::error::EngineError;
use crate::registry::SessionRegistry;
use crate::session::{ConnectionStatus, PendingSend, Session};
use lesp_gatt::{
    Attribute, ConnId, GattLink, LinkError, LinkEvent, MAX_PAYLOAD_BUDGET, PeerAddress, Role,
    payload_budget,
};
use lesp_security::SecurityEvent;

/// Disposition of a `submit_send` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every byte of the request went to the link in this call.
    AcceptedImmediately,
    /// Not everything shipped. `queued` is the transmit-buffer backlog
    /// after this call (this request's tail plus any older residue);
    /// `rejected` bytes fit neither the link nor the buffer and remain
    /// the caller's to resubmit.
    Queued {
        /// Bytes waiting in the transmit buffer.
        queued: usize,
        /// Trailing bytes of the request that were not admitted.
        rejected: usize,
    },
}

/// Credit-flow-controlled serial-port engine over a [`GattLink`].
pub struct TransportEngine<L: GattLink> {
    link: L,
    registry: SessionRegistry,
    config: PortConfig,
}

impl<L: GattLink> TransportEngine<L> {
    /// Create an engine owning `link`, with per-connection buffers sized
    /// from `config`.
    pub fn new(link: L, config: PortConfig) -> Self {
        Self {
            link,
            registry: SessionRegistry::new(config.clone()),
            config,
        }
    }

    /// The owned link, for harness control in tests and embedders.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Read access to the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Single entry point for every stack callback.
    ///
    /// # Errors
    ///
    /// Propagates the conditions that are surfaced upward: receive
    /// overflow, fatal link errors, unknown handles. Recoverable
    /// protocol anomalies are logged and swallowed here.
    pub fn handle_event(&mut self, event: LinkEvent) -> Result<(), EngineError> {
        match event {
            LinkEvent::Connected {
                peer,
                conn,
                role,
                att_mtu,
            } => {
                self.registry.on_connect(peer, conn, role, att_mtu)?;
                // Bootstrap: the whole empty receive buffer is owed to
                // the peer as the first grant.
                self.emit_credits(conn)
            }
            LinkEvent::Disconnected { peer: _, conn } => {
                self.registry.on_disconnect(conn).map(|_| ())
            }
            LinkEvent::DataReceived {
                conn,
                attribute: Attribute::Data,
                bytes,
            } => self.on_stream_data(conn, &bytes),
            LinkEvent::DataReceived {
                conn,
                attribute: Attribute::Credits,
                bytes,
            } => self.on_credit_message(conn, &bytes),
            LinkEvent::SubscriptionChanged {
                conn,
                attribute,
                enabled,
            } => self.on_subscription(conn, attribute, enabled),
            LinkEvent::LinkBufferDrained { conn } => self.on_link_drained(conn),
            LinkEvent::WriteResponse { conn } => {
                // Only consumed to retry the credit bootstrap.
                self.emit_credits(conn)
            }
            LinkEvent::ReadResponse { conn, bytes } => self.on_read_response(conn, &bytes),
        }
    }

    /// Security-state transitions for one connection.
    ///
    /// A failed key reuse deletes the peer's entry outright; a newly
    /// encrypted link immediately re-attempts the transmit drain.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownConnection`] or a security-machine misuse.
    pub fn handle_security(
        &mut self,
        conn: ConnId,
        event: SecurityEvent,
    ) -> Result<(), EngineError> {
        let is_reuse_failure = matches!(event, SecurityEvent::ReencryptionFailed);
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        let peer = session.peer();
        session.security.handle(event)?;

        if is_reuse_failure {
            // Peer refused the stored key: forget it ever bonded.
            self.registry.remove_peer(peer);
            return Ok(());
        }
        if self
            .registry
            .get_by_conn(conn)
            .is_some_and(|s| s.security().link_encrypted())
        {
            self.drain_tx(conn, &mut &[][..])?;
        }
        Ok(())
    }

    /// Submit stream bytes for transmission.
    ///
    /// Sends what credits and the link allow right now, buffers the rest,
    /// and reports any tail that fit nowhere. Queued bytes are delivered
    /// by later credit grants and drain signals without further calls.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownConnection`] for a dead handle, or a fatal
    /// link error (the current send is aborted, the connection stays
    /// usable).
    pub fn submit_send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<SendOutcome, EngineError> {
        {
            let session = self
                .registry
                .get_mut_by_conn(conn)
                .ok_or(EngineError::UnknownConnection(conn))?;
            let pending = session.pending_send.get_or_insert(PendingSend {
                total_requested: 0,
                bytes_sent: 0,
            });
            pending.total_requested += bytes.len();
        }

        let mut fresh: &[u8] = bytes;
        self.drain_tx(conn, &mut fresh)?;
        let rejected = fresh.len();

        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        session.stats.bytes_queued += (bytes.len() - rejected) as u64;
        if let Some(pending) = session.pending_send.as_mut() {
            pending.total_requested -= rejected;
        }

        let queued = session.tx_buffer.used();
        if queued == 0 && rejected == 0 {
            Ok(SendOutcome::AcceptedImmediately)
        } else {
            Ok(SendOutcome::Queued { queued, rejected })
        }
    }

    /// Hand received stream bytes to the application, freeing receive
    /// space and granting it back to the peer as credits.
    ///
    /// The drained bytes belong to the caller unconditionally: a failed
    /// credit send is logged, the freed space stays on the ledger, and
    /// the grant goes out on the next emission trigger.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownConnection`].
    pub fn poll_received(&mut self, conn: ConnId, max_len: usize) -> Result<Vec<u8>, EngineError> {
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        let out = session.rx_buffer.read(max_len);
        if !out.is_empty() {
            session.credits.on_rx_freed(out.len());
            if let Err(err) = self.emit_credits(conn) {
                tracing::warn!(%conn, %err, "credit grant failed after read; grant still owed");
            }
        }
        Ok(out)
    }

    /// Read-only snapshot of one connection.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownConnection`].
    pub fn connection_status(&self, conn: ConnId) -> Result<ConnectionStatus, EngineError> {
        self.registry
            .get_by_conn(conn)
            .map(Session::status)
            .ok_or(EngineError::UnknownConnection(conn))
    }

    /// Status by peer address; also reaches bonded sessions whose link
    /// is currently down.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownPeer`].
    pub fn peer_status(&self, peer: PeerAddress) -> Result<ConnectionStatus, EngineError> {
        self.registry
            .get_by_peer(peer)
            .map(Session::status)
            .ok_or(EngineError::UnknownPeer(peer))
    }

    fn on_stream_data(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), EngineError> {
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        let written = session.rx_buffer.write(bytes);
        session.stats.bytes_received += written as u64;
        if written < bytes.len() {
            let dropped = bytes.len() - written;
            session.stats.rx_bytes_dropped += dropped as u64;
            tracing::warn!(%conn, dropped, "receive buffer overflow; application lagging");
            return Err(EngineError::ReceiveOverflow { dropped });
        }
        Ok(())
    }

    fn on_credit_message(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), EngineError> {
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        match decode_credits(bytes) {
            Ok(amount) => {
                session.credits.grant_tx(amount as usize);
                session.stats.credit_messages_received += 1;
                tracing::debug!(%conn, amount, "credits received");
                self.drain_tx(conn, &mut &[][..]).map(|_| ())
            }
            Err(err) => {
                // Malformed grant: logged and ignored, connection usable.
                tracing::warn!(%conn, %err, "ignoring malformed credit notification");
                Ok(())
            }
        }
    }

    fn on_subscription(
        &mut self,
        conn: ConnId,
        attribute: Attribute,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        match attribute {
            Attribute::Data => session.subscribed_data = enabled,
            Attribute::Credits => session.subscribed_credits = enabled,
        }
        tracing::debug!(%conn, ?attribute, enabled, "subscription changed");
        if enabled {
            self.emit_credits(conn)?;
            self.drain_tx(conn, &mut &[][..])?;
        }
        Ok(())
    }

    /// The single shared backpressure flag cleared; both deferred paths
    /// retry. Credits go first so a mutually-stalled peer is unblocked
    /// before we spend our own credits.
    fn on_link_drained(&mut self, conn: ConnId) -> Result<(), EngineError> {
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        session.link_buffer_full = false;
        self.emit_credits(conn)?;
        self.drain_tx(conn, &mut &[][..]).map(|_| ())
    }

    fn on_read_response(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), EngineError> {
        if !bytes.is_empty() {
            // Reading the peer's credit attribute yields the initial
            // grant during bootstrap.
            return self.on_credit_message(conn, bytes);
        }
        self.emit_credits(conn)
    }

    /// The core drain step. Pulls buffered bytes first, then `fresh`,
    /// and advances `*fresh` past everything sent or absorbed. Returns
    /// bytes the link accepted during this call.
    fn drain_tx(&mut self, conn: ConnId, fresh: &mut &[u8]) -> Result<usize, EngineError> {
        let link = &mut self.link;
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;

        let mut sent_total = 0usize;
        if Self::may_drain(session) {
            let budget = payload_budget(session.att_mtu);
            // Fixed scratch keeps the drain loop allocation-free; the
            // budget never exceeds the largest MTU payload.
            let mut chunk = [0u8; MAX_PAYLOAD_BUDGET];
            while !session.link_buffer_full {
                let credits = session.credits.tx_credits();
                if credits == 0 {
                    break;
                }
                let available = session.tx_buffer.used() + fresh.len();
                if available == 0 {
                    break;
                }

                let want = credits.min(budget).min(available);
                let from_ring = session.tx_buffer.read_into(&mut chunk[..want]);
                let from_fresh = want - from_ring;
                chunk[from_ring..want].copy_from_slice(&fresh[..from_fresh]);

                match Self::deliver(link, session.role, conn, Attribute::Data, &chunk[..want]) {
                    Ok(accepted) => {
                        session.credits.consume_tx(accepted)?;
                        session.stats.bytes_sent_on_link += accepted as u64;
                        sent_total += accepted;

                        let ring_accepted = accepted.min(from_ring);
                        let fresh_accepted = accepted - ring_accepted;
                        let ring_remainder = from_ring - ring_accepted;
                        if ring_remainder > 0 {
                            session.tx_buffer.unread(ring_remainder).map_err(|_| {
                                EngineError::InvariantViolation("re-buffer after partial accept")
                            })?;
                        }
                        *fresh = &fresh[fresh_accepted..];

                        if accepted < want {
                            // Short acceptance: do not spin.
                            break;
                        }
                    }
                    Err(LinkError::BufferFull) => {
                        session.tx_buffer.unread(from_ring).map_err(|_| {
                            EngineError::InvariantViolation("re-buffer after buffer-full")
                        })?;
                        session.link_buffer_full = true;
                        tracing::debug!(%conn, "link backpressure on data path");
                        break;
                    }
                    Err(LinkError::NotSubscribed(attribute)) => {
                        session.tx_buffer.unread(from_ring).map_err(|_| {
                            EngineError::InvariantViolation("re-buffer after subscribe race")
                        })?;
                        tracing::warn!(%conn, ?attribute, "send before subscription; holding data");
                        break;
                    }
                    Err(err) => {
                        // Fatal for this send: drop the remainder and its
                        // accounting, keep the connection.
                        session.tx_buffer.reset();
                        session.pending_send = None;
                        *fresh = &fresh[fresh.len()..];
                        tracing::warn!(%conn, %err, "link send failed; current send aborted");
                        return Err(EngineError::Link(err));
                    }
                }
            }
        }

        // Absorb unsent new bytes so nothing is silently lost; whatever
        // does not fit goes back to the caller.
        if !fresh.is_empty() {
            let absorbed = session.tx_buffer.write(fresh);
            *fresh = &fresh[absorbed..];
        }

        if let Some(pending) = session.pending_send.as_mut() {
            pending.bytes_sent += sent_total;
        }
        if session.tx_buffer.is_empty() {
            session.pending_send = None;
        }
        Ok(sent_total)
    }

    /// Emit credit notifications until nothing is owed or the link
    /// pushes back. When `max_credit_message` caps a single grant below
    /// the owed amount, several messages leave in one call - the owed
    /// remainder must never wait for an unrelated future trigger. On
    /// backpressure the remainder parks as pending and this same routine
    /// flushes it - exactly once per byte - after the drain signal.
    fn emit_credits(&mut self, conn: ConnId) -> Result<(), EngineError> {
        let cap = self.config.max_credit_message;
        let link = &mut self.link;
        let session = self
            .registry
            .get_mut_by_conn(conn)
            .ok_or(EngineError::UnknownConnection(conn))?;

        if !session.is_connected() {
            return Ok(());
        }
        if session.role == Role::StreamNotifier && !session.subscribed_credits {
            return Ok(());
        }

        while !session.link_buffer_full {
            let amount = session.credits.emittable(session.rx_buffer.capacity(), cap);
            if amount == 0 {
                break;
            }
            let payload = encode_credits(amount);
            match Self::deliver(link, session.role, conn, Attribute::Credits, &payload) {
                Ok(n) if n == payload.len() => {
                    session.credits.mark_emitted(amount)?;
                    session.stats.credit_messages_sent += 1;
                    tracing::debug!(%conn, amount, "credits granted to peer");
                }
                Ok(_) => {
                    // A short accept of the 2-byte counter is queue
                    // exhaustion in disguise; resend the whole message
                    // later.
                    session.link_buffer_full = true;
                    session.credits.defer_emission();
                }
                Err(LinkError::BufferFull) => {
                    session.link_buffer_full = true;
                    session.credits.defer_emission();
                    tracing::debug!(%conn, amount, "link backpressure on credit path");
                }
                Err(LinkError::NotSubscribed(attribute)) => {
                    // Grant stays owed; retried when the subscription
                    // lands.
                    tracing::warn!(%conn, ?attribute, "credit send before subscription");
                    break;
                }
                Err(err) => {
                    tracing::warn!(%conn, %err, "credit send failed");
                    return Err(EngineError::Link(err));
                }
            }
        }
        Ok(())
    }

    /// Stall conditions the drain loop respects without treating them as
    /// errors: dead link, unencrypted link, missing data subscription.
    fn may_drain(session: &Session) -> bool {
        session.is_connected()
            && session.security.link_encrypted()
            && (session.role != Role::StreamNotifier || session.subscribed_data)
    }

    fn deliver(
        link: &mut L,
        role: Role,
        conn: ConnId,
        attribute: Attribute,
        bytes: &[u8],
    ) -> Result<usize, LinkError> {
        match role {
            Role::StreamNotifier => link.notify(conn, attribute, bytes),
            Role::StreamWriter => link.send(conn, attribute, bytes),
        }
    }
}
