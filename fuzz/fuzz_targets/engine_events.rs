//! Fuzz target for the transport engine's event loop
//!
//! Feeds arbitrary event sequences to one engine. No sequence may
//! panic or corrupt the buffer accounting.

#![no_main]

use arbitrary::Arbitrary;
use lesp_core::{PortConfig, SendOutcome, TransportEngine};
use lesp_gatt::{Attribute, ConnId, LinkEvent, LoopbackLink, PeerAddress, Role, SendRuling};
use lesp_security::SecurityEvent;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Connect { writer: bool, att_mtu: u16 },
    Disconnect,
    Data(Vec<u8>),
    CreditMsg(Vec<u8>),
    Subscription { data_attr: bool, enabled: bool },
    DrainSignal,
    ScriptReject,
    ScriptPartial(u8),
    Submit(Vec<u8>),
    Poll(u8),
    Pair,
}

const CONN: ConnId = ConnId(1);
const PEER: PeerAddress = PeerAddress([9, 9, 9, 9, 9, 9]);

fuzz_target!(|ops: Vec<Op>| {
    let config = PortConfig {
        tx_buffer_capacity: 64,
        rx_buffer_capacity: 48,
        max_connections: 1,
        max_credit_message: u16::MAX,
    };
    let mut engine = TransportEngine::new(LoopbackLink::new(), config);

    for op in ops {
        match op {
            Op::Connect { writer, att_mtu } => {
                engine.link_mut().connect(CONN);
                let role = if writer {
                    Role::StreamWriter
                } else {
                    Role::StreamNotifier
                };
                let _ = engine.handle_event(LinkEvent::Connected {
                    peer: PEER,
                    conn: CONN,
                    role,
                    att_mtu,
                });
            }
            Op::Disconnect => {
                engine.link_mut().disconnect(CONN);
                let _ = engine.handle_event(LinkEvent::Disconnected {
                    peer: PEER,
                    conn: CONN,
                });
            }
            Op::Data(bytes) => {
                let _ = engine.handle_event(LinkEvent::DataReceived {
                    conn: CONN,
                    attribute: Attribute::Data,
                    bytes,
                });
            }
            Op::CreditMsg(bytes) => {
                let _ = engine.handle_event(LinkEvent::DataReceived {
                    conn: CONN,
                    attribute: Attribute::Credits,
                    bytes,
                });
            }
            Op::Subscription { data_attr, enabled } => {
                let attribute = if data_attr {
                    Attribute::Data
                } else {
                    Attribute::Credits
                };
                if enabled {
                    engine.link_mut().subscribe(CONN, attribute);
                } else {
                    engine.link_mut().unsubscribe(CONN, attribute);
                }
                let _ = engine.handle_event(LinkEvent::SubscriptionChanged {
                    conn: CONN,
                    attribute,
                    enabled,
                });
            }
            Op::DrainSignal => {
                engine.link_mut().drain();
                let _ = engine.handle_event(LinkEvent::LinkBufferDrained { conn: CONN });
            }
            Op::ScriptReject => engine.link_mut().script(SendRuling::RejectBufferFull),
            Op::ScriptPartial(n) => engine
                .link_mut()
                .script(SendRuling::AcceptPartial(n as usize)),
            Op::Submit(bytes) => {
                if let Ok(SendOutcome::Queued { rejected, .. }) = engine.submit_send(CONN, &bytes) {
                    // Rejected bytes stay with the caller; nothing to do.
                    assert!(rejected <= bytes.len());
                }
            }
            Op::Poll(n) => {
                let _ = engine.poll_received(CONN, n as usize);
            }
            Op::Pair => {
                let _ = engine.handle_security(CONN, SecurityEvent::PairingRequested);
                let _ = engine.handle_security(CONN, SecurityEvent::PairingCompleted { key: None });
            }
        }

        if let Ok(status) = engine.connection_status(CONN) {
            let stats = status.stats;
            assert!(stats.bytes_sent_on_link <= stats.bytes_queued);
            assert!(status.tx_buffered <= 64);
        }
    }
});
