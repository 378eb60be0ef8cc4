//! Shared helpers for the integration and property test suites.
//!
//! The centerpiece is [`EnginePair`]: two engines wired back-to-back so
//! that whatever one side's link accepts is replayed into the other side
//! as received data, credits included. This exercises the full
//! credit-flow loop without a radio.

use lesp_core::{EngineError, PortConfig, TransportEngine};
use lesp_gatt::{Attribute, ConnId, LinkEvent, LoopbackLink, PeerAddress, Role};
use lesp_security::SecurityEvent;
use rand::RngCore;
use std::sync::Once;

/// Address the central sees for the peripheral.
pub const PERIPHERAL_ADDR: PeerAddress = PeerAddress([0xAA, 0x11, 0x22, 0x33, 0x44, 0x55]);
/// Address the peripheral sees for the central.
pub const CENTRAL_ADDR: PeerAddress = PeerAddress([0xBB, 0x66, 0x77, 0x88, 0x99, 0x00]);

const CENTRAL_CONN: ConnId = ConnId(0x0040);
const PERIPHERAL_CONN: ConnId = ConnId(0x0041);

static INIT: Once = Once::new();

/// Install a test-friendly tracing subscriber, once per process.
/// `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Random stream payload of the given length.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Two engines joined by replaying each side's link traffic into the
/// other. The central plays [`Role::StreamWriter`], the peripheral
/// [`Role::StreamNotifier`].
pub struct EnginePair {
    pub central: TransportEngine<LoopbackLink>,
    pub peripheral: TransportEngine<LoopbackLink>,
    pub central_conn: ConnId,
    pub peripheral_conn: ConnId,
}

impl EnginePair {
    /// Bring up both sides: connect, subscribe, pair (no bonding key),
    /// and exchange the bootstrap credit grants.
    pub fn connect(config: PortConfig) -> Result<Self, EngineError> {
        Self::connect_with_mtu(config, 247)
    }

    /// Same as [`EnginePair::connect`] with an explicit ATT MTU.
    pub fn connect_with_mtu(config: PortConfig, att_mtu: u16) -> Result<Self, EngineError> {
        init_tracing();
        let mut central = TransportEngine::new(LoopbackLink::new(), config.clone());
        let mut peripheral = TransportEngine::new(LoopbackLink::new(), config);

        central.link_mut().connect(CENTRAL_CONN);
        peripheral.link_mut().connect(PERIPHERAL_CONN);
        peripheral
            .link_mut()
            .subscribe(PERIPHERAL_CONN, Attribute::Data);
        peripheral
            .link_mut()
            .subscribe(PERIPHERAL_CONN, Attribute::Credits);

        central.handle_event(LinkEvent::Connected {
            peer: PERIPHERAL_ADDR,
            conn: CENTRAL_CONN,
            role: Role::StreamWriter,
            att_mtu,
        })?;
        peripheral.handle_event(LinkEvent::Connected {
            peer: CENTRAL_ADDR,
            conn: PERIPHERAL_CONN,
            role: Role::StreamNotifier,
            att_mtu,
        })?;
        for attribute in [Attribute::Data, Attribute::Credits] {
            peripheral.handle_event(LinkEvent::SubscriptionChanged {
                conn: PERIPHERAL_CONN,
                attribute,
                enabled: true,
            })?;
        }
        for (engine, conn) in [
            (&mut central, CENTRAL_CONN),
            (&mut peripheral, PERIPHERAL_CONN),
        ] {
            engine.handle_security(conn, SecurityEvent::PairingRequested)?;
            engine.handle_security(conn, SecurityEvent::PairingCompleted { key: None })?;
        }

        let mut pair = Self {
            central,
            peripheral,
            central_conn: CENTRAL_CONN,
            peripheral_conn: PERIPHERAL_CONN,
        };
        pair.pump()?;
        Ok(pair)
    }

    /// Replay link traffic between the sides until neither produces any
    /// more. Returns the first engine error either side raises.
    pub fn pump(&mut self) -> Result<(), EngineError> {
        loop {
            let from_central = self.central.link_mut().take_sent();
            let from_peripheral = self.peripheral.link_mut().take_sent();
            if from_central.is_empty() && from_peripheral.is_empty() {
                return Ok(());
            }
            for record in from_central {
                self.peripheral.handle_event(LinkEvent::DataReceived {
                    conn: PERIPHERAL_CONN,
                    attribute: record.attribute,
                    bytes: record.bytes,
                })?;
            }
            for record in from_peripheral {
                self.central.handle_event(LinkEvent::DataReceived {
                    conn: CENTRAL_CONN,
                    attribute: record.attribute,
                    bytes: record.bytes,
                })?;
            }
        }
    }

    /// Drain everything the peripheral's application can read, pumping
    /// the resulting credit grants back to the central.
    pub fn read_all_at_peripheral(&mut self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        loop {
            let chunk = self.peripheral.poll_received(PERIPHERAL_CONN, usize::MAX)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
            self.pump()?;
        }
    }
}
