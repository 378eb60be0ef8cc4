//! Session registry: a fixed arena of per-peer slots.
//!
//! Sessions live in a fixed-size slot arena so no allocation happens per
//! packet or per event. Lookup works two ways: by stable peer address
//! (survives reconnects, keys the bonding table) and by the transient
//! connection handle the stack issued for the current link. A peer's slot
//! is released only when it is neither connected nor bonded.

use crate::config::PortConfig;
use crate::error::EngineError;
use crate::session::Session;
use lesp_gatt::{ConnId, PeerAddress, Role};
use std::collections::HashMap;

/// What happened to a session at disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Peer is not bonded; the entry was deleted.
    Removed,
    /// Peer is bonded; connection-scoped state was cleared, the key kept.
    Retained,
}

/// Arena of sessions with identity and handle lookup.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Option<Session>>,
    by_peer: HashMap<PeerAddress, usize>,
    by_conn: HashMap<ConnId, usize>,
    config: PortConfig,
}

impl SessionRegistry {
    /// Create an empty registry sized to `config.max_connections`.
    #[must_use]
    pub fn new(config: PortConfig) -> Self {
        let slots = (0..config.max_connections).map(|_| None).collect();
        Self {
            slots,
            by_peer: HashMap::new(),
            by_conn: HashMap::new(),
            config,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    /// Whether no sessions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    /// Total slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Find or allocate the slot for `peer`. Idempotent: a bonded but
    /// disconnected peer gets its existing slot back, and no identity
    /// ever occupies two slots.
    ///
    /// # Errors
    ///
    /// [`EngineError::RegistryFull`] if the peer is new and every slot is
    /// taken.
    pub fn create_or_get(&mut self, peer: PeerAddress) -> Result<usize, EngineError> {
        if let Some(&slot) = self.by_peer.get(&peer) {
            return Ok(slot);
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(EngineError::RegistryFull(self.slots.len()))?;
        self.slots[slot] = Some(Session::new(peer, &self.config));
        self.by_peer.insert(peer, slot);
        tracing::info!(%peer, slot, "session allocated");
        Ok(slot)
    }

    /// Handle a connection-established event: find or allocate the slot,
    /// reset live-link fields, and index the stack handle.
    ///
    /// # Errors
    ///
    /// [`EngineError::RegistryFull`] if a new peer cannot be admitted.
    pub fn on_connect(
        &mut self,
        peer: PeerAddress,
        conn: ConnId,
        role: Role,
        att_mtu: u16,
    ) -> Result<&mut Session, EngineError> {
        let slot = self.create_or_get(peer)?;
        self.by_conn.insert(conn, slot);
        let session = self.slots[slot]
            .as_mut()
            .ok_or(EngineError::InvariantViolation("indexed slot is empty"))?;
        session.on_connect(conn, role, att_mtu);
        tracing::info!(%peer, %conn, ?role, att_mtu, "connected");
        Ok(session)
    }

    /// Handle a disconnect: clear connection-scoped state, delete the
    /// entry entirely unless the peer is bonded.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownConnection`] if the handle is not indexed.
    pub fn on_disconnect(&mut self, conn: ConnId) -> Result<DisconnectOutcome, EngineError> {
        let slot = self
            .by_conn
            .remove(&conn)
            .ok_or(EngineError::UnknownConnection(conn))?;
        let session = self.slots[slot]
            .as_mut()
            .ok_or(EngineError::InvariantViolation("indexed slot is empty"))?;
        session.on_disconnect();

        let peer = session.peer();
        if session.is_bonded() {
            tracing::info!(%peer, "disconnected, bond retained");
            Ok(DisconnectOutcome::Retained)
        } else {
            self.by_peer.remove(&peer);
            self.slots[slot] = None;
            tracing::info!(%peer, "disconnected, session removed");
            Ok(DisconnectOutcome::Removed)
        }
    }

    /// Delete a peer's entry outright, bond and all. Used when the peer
    /// refuses the stored key.
    pub fn remove_peer(&mut self, peer: PeerAddress) -> bool {
        let Some(slot) = self.by_peer.remove(&peer) else {
            return false;
        };
        if let Some(session) = self.slots[slot].take() {
            if let Some(conn) = session.conn() {
                self.by_conn.remove(&conn);
            }
        }
        tracing::info!(%peer, "session deleted");
        true
    }

    /// Look up by the transient stack handle.
    #[must_use]
    pub fn get_by_conn(&self, conn: ConnId) -> Option<&Session> {
        let slot = *self.by_conn.get(&conn)?;
        self.slots[slot].as_ref()
    }

    /// Mutable lookup by the transient stack handle.
    pub fn get_mut_by_conn(&mut self, conn: ConnId) -> Option<&mut Session> {
        let slot = *self.by_conn.get(&conn)?;
        self.slots[slot].as_mut()
    }

    /// Look up by stable peer identity.
    #[must_use]
    pub fn get_by_peer(&self, peer: PeerAddress) -> Option<&Session> {
        let slot = *self.by_peer.get(&peer)?;
        self.slots[slot].as_ref()
    }

    /// Mutable lookup by stable peer identity.
    pub fn get_mut_by_peer(&mut self, peer: PeerAddress) -> Option<&mut Session> {
        let slot = *self.by_peer.get(&peer)?;
        self.slots[slot].as_mut()
    }

    /// Iterate over live sessions.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
