//! The pairing/bonding state machine.

use crate::error::SecurityError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 128-bit long-term key established by bonding.
///
/// Only presence matters to the transport; the bytes are opaque here and
/// wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BondingKey([u8; 16]);

impl BondingKey {
    /// Wrap key material handed over by the controller stack.
    #[must_use]
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Key bytes, for handing back to the stack on reconnect.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for BondingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BondingKey(..)")
    }
}

/// Pairing lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    /// No security established, no pairing running.
    #[default]
    Unauthenticated,
    /// Pairing handshake running on the link.
    PairingInProgress,
    /// Pairing (or key reuse) complete.
    Paired,
    /// Bonded peer reconnected; stack is re-encrypting with the stored key.
    Reestablishing,
    /// Pairing or key reuse failed. Terminal until a fresh pairing starts.
    Failed,
}

/// Events the controller stack reports about one connection's security.
#[derive(Debug)]
pub enum SecurityEvent {
    /// A pairing handshake started.
    PairingRequested,
    /// Pairing completed; `key` is present when the peers also bonded.
    PairingCompleted {
        /// Long-term key, if the pairing included bonding.
        key: Option<BondingKey>,
    },
    /// Pairing was rejected or timed out.
    PairingFailed,
    /// A bonded peer reconnected and key reuse began.
    ReencryptionRequested,
    /// The stored key re-encrypted the link.
    ReencryptionSucceeded,
    /// The peer no longer accepts the stored key.
    ReencryptionFailed,
}

impl SecurityEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::PairingRequested => "PairingRequested",
            Self::PairingCompleted { .. } => "PairingCompleted",
            Self::PairingFailed => "PairingFailed",
            Self::ReencryptionRequested => "ReencryptionRequested",
            Self::ReencryptionSucceeded => "ReencryptionSucceeded",
            Self::ReencryptionFailed => "ReencryptionFailed",
        }
    }
}

/// Per-connection pairing machine.
///
/// Driven by [`SecurityEvent`]s from within the connection's serialized
/// event handlers; never blocks, never calls back into the stack.
#[derive(Debug, Default)]
pub struct PairingMachine {
    state: PairingState,
    link_encrypted: bool,
    key: Option<BondingKey>,
}

impl PairingMachine {
    /// Fresh machine: unauthenticated, no key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Whether the link is currently encrypted.
    #[must_use]
    pub fn link_encrypted(&self) -> bool {
        self.link_encrypted
    }

    /// Whether a long-term key is stored.
    #[must_use]
    pub fn has_bond(&self) -> bool {
        self.key.is_some()
    }

    /// Stored long-term key, if any.
    #[must_use]
    pub fn bonding_key(&self) -> Option<&BondingKey> {
        self.key.as_ref()
    }

    /// Whether `event` is legal in the current state.
    #[must_use]
    pub fn accepts(&self, event: &SecurityEvent) -> bool {
        matches!(
            (self.state, event),
            (
                PairingState::Unauthenticated | PairingState::Failed,
                SecurityEvent::PairingRequested
            ) | (
                PairingState::PairingInProgress,
                SecurityEvent::PairingCompleted { .. } | SecurityEvent::PairingFailed
            ) | (PairingState::Paired, SecurityEvent::ReencryptionRequested)
                | (
                    PairingState::Reestablishing,
                    SecurityEvent::ReencryptionSucceeded | SecurityEvent::ReencryptionFailed
                )
        )
    }

    /// Apply one event, returning the new state.
    ///
    /// # Errors
    ///
    /// [`SecurityError::InvalidTransition`] if the event is not legal in
    /// the current state, [`SecurityError::NoBondingKey`] if key reuse is
    /// requested without a stored key. State is unchanged on error.
    pub fn handle(&mut self, event: SecurityEvent) -> Result<PairingState, SecurityError> {
        if !self.accepts(&event) {
            return Err(SecurityError::InvalidTransition {
                state: self.state,
                event: event.name(),
            });
        }

        let from = self.state;
        match event {
            SecurityEvent::PairingRequested => {
                self.state = PairingState::PairingInProgress;
            }
            SecurityEvent::PairingCompleted { key } => {
                if key.is_some() {
                    self.key = key;
                }
                self.link_encrypted = true;
                self.state = PairingState::Paired;
            }
            SecurityEvent::PairingFailed => {
                self.link_encrypted = false;
                self.state = PairingState::Failed;
            }
            SecurityEvent::ReencryptionRequested => {
                if self.key.is_none() {
                    return Err(SecurityError::NoBondingKey);
                }
                self.state = PairingState::Reestablishing;
            }
            SecurityEvent::ReencryptionSucceeded => {
                self.link_encrypted = true;
                self.state = PairingState::Paired;
            }
            SecurityEvent::ReencryptionFailed => {
                // Registry deletes the entry on the strength of this.
                self.key = None;
                self.link_encrypted = false;
                self.state = PairingState::Failed;
            }
        }

        tracing::debug!("pairing transition: {:?} -> {:?}", from, self.state);
        Ok(self.state)
    }

    /// Reset link-scoped security on disconnect, keeping the bond.
    ///
    /// A bonded peer comes back as `Paired` (awaiting key reuse); anyone
    /// else starts over unauthenticated.
    pub fn reset_link(&mut self) {
        self.link_encrypted = false;
        self.state = if self.key.is_some() {
            PairingState::Paired
        } else {
            PairingState::Unauthenticated
        };
    }

    /// Drop the stored key and return to the unauthenticated state.
    pub fn forget_bond(&mut self) {
        self.key = None;
        self.link_encrypted = false;
        self.state = PairingState::Unauthenticated;
    }
}
