//! Error types for the pairing state machine.

use crate::pairing::PairingState;
use thiserror::Error;

/// Failures the pairing machine can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// An event arrived that is not legal in the current state.
    #[error("security event {event} not valid in state {state:?}")]
    InvalidTransition {
        /// State the machine was in when the event arrived.
        state: PairingState,
        /// Name of the offending event.
        event: &'static str,
    },

    /// Key reuse was requested but no bonding key is stored.
    #[error("no bonding key stored for key reuse")]
    NoBondingKey,
}
