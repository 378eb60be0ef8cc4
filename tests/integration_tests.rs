//! End-to-end tests of the credit-flow loop between two engines.
//!
//! An [`EnginePair`] wires a writer-role central to a notifier-role
//! peripheral through loopback links, so data, credit grants, and
//! backpressure all travel the same paths they would over a radio.

use lesp_core::{EngineState, PortConfig, SendOutcome};
use lesp_gatt::SendRuling;
use lesp_integration_tests::{EnginePair, random_payload};

fn small_config() -> PortConfig {
    PortConfig {
        tx_buffer_capacity: 64,
        rx_buffer_capacity: 32,
        max_connections: 2,
        max_credit_message: u16::MAX,
    }
}

// ============================================================================
// Stream delivery
// ============================================================================

/// Bytes submitted on one side come out the other side intact and in
/// order, within the initial credit window.
#[test]
fn test_end_to_end_delivery_within_window() {
    let mut pair = EnginePair::connect(small_config()).unwrap();
    let payload = random_payload(30);

    let outcome = pair
        .central
        .submit_send(pair.central_conn, &payload)
        .unwrap();
    assert_eq!(outcome, SendOutcome::AcceptedImmediately);
    pair.pump().unwrap();

    let received = pair
        .peripheral
        .poll_received(pair.peripheral_conn, 64)
        .unwrap();
    assert_eq!(received, payload);
}

/// A transfer much larger than the receive window completes once the
/// reader keeps draining: credits keep coming back and nothing is
/// dropped or reordered.
#[test]
fn test_large_transfer_survives_small_window() {
    let mut pair = EnginePair::connect(small_config()).unwrap();
    let payload = random_payload(500);

    let mut received = Vec::new();
    let mut cursor = 0usize;
    while received.len() < payload.len() {
        if cursor < payload.len() {
            let end = (cursor + 48).min(payload.len());
            pair.central
                .submit_send(pair.central_conn, &payload[cursor..end])
                .unwrap();
            cursor = end;
        }
        pair.pump().unwrap();
        received.extend(pair.read_all_at_peripheral().unwrap());
    }
    assert_eq!(received, payload);

    let stats = pair
        .central
        .connection_status(pair.central_conn)
        .unwrap()
        .stats;
    assert_eq!(stats.bytes_sent_on_link, 500);
}

/// The notifier side can send too: its notifications become received
/// bytes at the central.
#[test]
fn test_peripheral_to_central_direction() {
    let mut pair = EnginePair::connect(small_config()).unwrap();
    pair.peripheral
        .submit_send(pair.peripheral_conn, b"telemetry")
        .unwrap();
    pair.pump().unwrap();

    let received = pair.central.poll_received(pair.central_conn, 64).unwrap();
    assert_eq!(received, b"telemetry");
}

// ============================================================================
// Flow control
// ============================================================================

/// A reader that never polls starves the sender: exactly one window of
/// bytes crosses the link, the rest queue at the sender.
#[test]
fn test_unread_window_starves_sender() {
    let mut pair = EnginePair::connect(small_config()).unwrap();
    let payload = random_payload(50); // window is 32

    pair.central
        .submit_send(pair.central_conn, &payload)
        .unwrap();
    pair.pump().unwrap();

    let status = pair.central.connection_status(pair.central_conn).unwrap();
    assert_eq!(status.state, EngineState::CreditStarved);
    assert_eq!(status.tx_credits, 0);
    assert_eq!(status.tx_buffered, 18);

    // Draining the reader releases exactly the freed amount.
    let first = pair
        .peripheral
        .poll_received(pair.peripheral_conn, 32)
        .unwrap();
    assert_eq!(first.len(), 32);
    pair.pump().unwrap();

    let rest = pair
        .peripheral
        .poll_received(pair.peripheral_conn, 32)
        .unwrap();
    let mut received = first;
    received.extend(rest);
    assert_eq!(received, payload);
    assert_eq!(
        pair.central
            .connection_status(pair.central_conn)
            .unwrap()
            .state,
        EngineState::Idle
    );
}

/// Credits granted never exceed receive capacity, no matter how the
/// reader interleaves partial drains.
#[test]
fn test_grants_never_exceed_receive_capacity() {
    let mut pair = EnginePair::connect(small_config()).unwrap();
    let payload = random_payload(200);

    let mut sent = 0usize;
    let mut total_received = 0usize;
    while total_received < payload.len() {
        if sent < payload.len() {
            let end = (sent + 20).min(payload.len());
            match pair
                .central
                .submit_send(pair.central_conn, &payload[sent..end])
                .unwrap()
            {
                SendOutcome::AcceptedImmediately => sent = end,
                SendOutcome::Queued { rejected, .. } => sent = end - rejected,
            }
        }
        pair.pump().unwrap();
        // Partial drains of odd sizes.
        let chunk = pair
            .peripheral
            .poll_received(pair.peripheral_conn, 7)
            .unwrap();
        total_received += chunk.len();
        pair.pump().unwrap();

        // With no grants in flight, the sender's window plus the bytes
        // still parked at the receiver can never exceed the window.
        let credits = pair
            .central
            .connection_status(pair.central_conn)
            .unwrap()
            .tx_credits;
        let parked = pair
            .peripheral
            .connection_status(pair.peripheral_conn)
            .unwrap()
            .rx_buffered;
        assert!(credits + parked <= 32, "credit window overcommitted");
    }
}

/// Link backpressure pauses both data and credit emission; the drain
/// signal resumes both and the stream completes.
#[test]
fn test_link_backpressure_pauses_and_resumes() {
    let mut pair = EnginePair::connect(small_config()).unwrap();

    pair.central.link_mut().script(SendRuling::RejectBufferFull);
    pair.central
        .submit_send(pair.central_conn, b"held back")
        .unwrap();
    let status = pair.central.connection_status(pair.central_conn).unwrap();
    assert_eq!(status.state, EngineState::LinkBackpressured);
    assert!(pair.central.link_mut().take_sent().is_empty());

    pair.central.link_mut().drain();
    pair.central
        .handle_event(lesp_gatt::LinkEvent::LinkBufferDrained {
            conn: pair.central_conn,
        })
        .unwrap();
    pair.pump().unwrap();
    assert_eq!(
        pair.peripheral
            .poll_received(pair.peripheral_conn, 64)
            .unwrap(),
        b"held back"
    );
}

// ============================================================================
// Sessions and security
// ============================================================================

/// A bonded peer's entry survives disconnect; reconnecting reuses it
/// with a fresh credit window, and queued data from the old link is
/// gone.
#[test]
fn test_bonded_reconnect_resets_flow_state() {
    use lesp_gatt::{LinkEvent, Role};
    use lesp_security::{BondingKey, SecurityEvent};

    let mut pair = EnginePair::connect(small_config()).unwrap();
    pair.central
        .handle_security(
            pair.central_conn,
            SecurityEvent::ReencryptionRequested, // no key yet: rejected
        )
        .unwrap_err();

    // Bond properly by redoing pairing with a key.
    let mut central = pair.central;
    central
        .handle_event(LinkEvent::Disconnected {
            peer: lesp_integration_tests::PERIPHERAL_ADDR,
            conn: pair.central_conn,
        })
        .unwrap();
    assert!(
        central
            .registry()
            .get_by_peer(lesp_integration_tests::PERIPHERAL_ADDR)
            .is_none()
    );

    central.link_mut().connect(pair.central_conn);
    central
        .handle_event(LinkEvent::Connected {
            peer: lesp_integration_tests::PERIPHERAL_ADDR,
            conn: pair.central_conn,
            role: Role::StreamWriter,
            att_mtu: 247,
        })
        .unwrap();
    central
        .handle_security(pair.central_conn, SecurityEvent::PairingRequested)
        .unwrap();
    central
        .handle_security(
            pair.central_conn,
            SecurityEvent::PairingCompleted {
                key: Some(BondingKey::new([0x5A; 16])),
            },
        )
        .unwrap();
    central.submit_send(pair.central_conn, b"leftover").unwrap();

    // Bonded: the session outlives the link, minus live state.
    central
        .handle_event(LinkEvent::Disconnected {
            peer: lesp_integration_tests::PERIPHERAL_ADDR,
            conn: pair.central_conn,
        })
        .unwrap();
    let session = central
        .registry()
        .get_by_peer(lesp_integration_tests::PERIPHERAL_ADDR)
        .expect("bonded session retained");
    assert!(session.is_bonded());
    assert!(!session.is_connected());

    central.link_mut().connect(pair.central_conn);
    central
        .handle_event(LinkEvent::Connected {
            peer: lesp_integration_tests::PERIPHERAL_ADDR,
            conn: pair.central_conn,
            role: Role::StreamWriter,
            att_mtu: 247,
        })
        .unwrap();
    let status = central.connection_status(pair.central_conn).unwrap();
    assert!(status.bonded);
    assert_eq!(status.tx_buffered, 0, "stale queued data must not survive");
    assert_eq!(status.tx_credits, 0, "credits never carry across links");
}

/// Status snapshots serialize, so embedders can export them as-is.
#[test]
fn test_status_snapshot_serializes() {
    let pair = EnginePair::connect(small_config()).unwrap();
    let status = pair.central.connection_status(pair.central_conn).unwrap();
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["state"], "Idle");
    assert_eq!(value["link_encrypted"], true);
    assert_eq!(value["tx_credits"], 32);
}
