//! ATT MTU limits and the per-notification payload budget.

/// ATT notification/write header overhead in bytes (opcode + handle).
pub const ATT_HEADER_LEN: usize = 3;

/// Default ATT MTU before (or without) exchange.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Smallest MTU the protocol permits.
pub const MIN_ATT_MTU: u16 = 23;

/// Largest MTU we will honour from negotiation.
pub const MAX_ATT_MTU: u16 = 517;

/// Upper bound of [`payload_budget`], handy for fixed scratch buffers.
pub const MAX_PAYLOAD_BUDGET: usize = MAX_ATT_MTU as usize - ATT_HEADER_LEN;

/// Usable stream payload per notification/write for a negotiated MTU.
///
/// Out-of-range values are clamped rather than rejected: MTU is reported
/// by the stack at connect time and a bogus report should degrade to the
/// nearest legal chunk size, not kill the connection.
#[must_use]
pub fn payload_budget(att_mtu: u16) -> usize {
    let mtu = att_mtu.clamp(MIN_ATT_MTU, MAX_ATT_MTU);
    mtu as usize - ATT_HEADER_LEN
}
