//! Mock link for integration tests.
//!
//! `MockTransport` records every outbound frame and lets tests inject
//! inbound frames and flip the connection state, without sockets, UARTs
//! or a BLE stack. `Harness` wires it into a running session with one
//! console, one graphics and one map channel.

use std::sync::{Arc, Mutex};

use arctic_link::adapters::firmware::{FlashTarget, IMAGE_MAGIC};
use arctic_link::adapters::md5_digest::Md5Digest;
use arctic_link::error::TransportError;
use arctic_link::link::codec::encode_chunk;
use arctic_link::link::{ChannelIds, DeviceInfo, Frame};
use arctic_link::{Console, Graphics, LinkConfig, Map, Session, Transport, TransportKind};

// ── Wire state ────────────────────────────────────────────────

#[derive(Default)]
struct WireState {
    connected: bool,
    inbound: Vec<Frame>,
    sent: Vec<(String, Vec<u8>)>,
    registered: Vec<ChannelIds>,
    keepalives: usize,
    disconnects: usize,
}

/// Test-side view of the mock transport.
#[derive(Clone, Default)]
pub struct Wire(Arc<Mutex<WireState>>);

#[allow(dead_code)]
impl Wire {
    fn with<R>(&self, f: impl FnOnce(&mut WireState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    pub fn connect(&self) {
        self.with(|w| w.connected = true);
    }

    pub fn drop_link(&self) {
        self.with(|w| w.connected = false);
    }

    pub fn inject(&self, id: &str, payload: impl AsRef<[u8]>) {
        let frame = Frame::new(id, payload.as_ref()).unwrap();
        self.with(|w| w.inbound.push(frame));
    }

    /// Text payloads sent to `id`, in order.
    pub fn sent_to(&self, id: &str) -> Vec<String> {
        self.with(|w| {
            w.sent
                .iter()
                .filter(|(to, _)| to == id)
                .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
                .collect()
        })
    }

    pub fn sent_count(&self) -> usize {
        self.with(|w| w.sent.len())
    }

    pub fn clear_sent(&self) {
        self.with(|w| w.sent.clear());
    }

    pub fn registered(&self) -> Vec<ChannelIds> {
        self.with(|w| w.registered.clone())
    }

    pub fn keepalives(&self) -> usize {
        self.with(|w| w.keepalives)
    }

    pub fn disconnects(&self) -> usize {
        self.with(|w| w.disconnects)
    }
}

pub struct MockTransport {
    kind: TransportKind,
    wire: Wire,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> (Self, Wire) {
        let wire = Wire::default();
        (
            Self {
                kind,
                wire: wire.clone(),
            },
            wire,
        )
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn register(&mut self, ids: &ChannelIds) -> Result<(), TransportError> {
        self.wire.with(|w| w.registered.push(ids.clone()));
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.wire.with(|w| {
            if !w.connected {
                return Err(TransportError::NotConnected);
            }
            w.sent.push((id.to_owned(), payload.to_vec()));
            Ok(())
        })
    }

    fn poll_inbound(&mut self, _now_ms: u64, out: &mut Vec<Frame>) {
        self.wire.with(|w| out.append(&mut w.inbound));
    }

    fn is_connected(&self) -> bool {
        self.wire.with(|w| w.connected)
    }

    fn keepalive(&mut self) -> Result<(), TransportError> {
        self.wire.with(|w| w.keepalives += 1);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.wire.with(|w| {
            w.connected = false;
            w.disconnects += 1;
        });
    }
}

// ── Harness ───────────────────────────────────────────────────

pub const FLASH_CAPACITY: u32 = 64 * 1024;

#[allow(dead_code)]
pub struct Harness {
    pub session: Session,
    pub wire: Wire,
    pub console: Arc<Console>,
    pub graphics: Arc<Graphics>,
    pub map: Arc<Map>,
    pub now_ms: u64,
    kind: TransportKind,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(kind: TransportKind) -> Self {
        Self::with_config(LinkConfig {
            transport: kind,
            ..LinkConfig::default()
        })
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let kind = config.transport;
        let mut session = Session::new(
            config,
            DeviceInfo::new("Bench", [0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]),
            Box::new(FlashTarget::new(FLASH_CAPACITY)),
            Box::new(Md5Digest::new()),
        );
        let (transport, wire) = MockTransport::new(kind);
        session.begin(Box::new(transport)).unwrap();

        let console = Arc::new(Console::new("Main"));
        let graphics = Arc::new(Graphics::new("Plots"));
        let map = Arc::new(Map::new("Route"));
        session.add(console.clone()).unwrap();
        session.add(graphics.clone()).unwrap();
        session.add(map.clone()).unwrap();
        session.start().unwrap();

        Self {
            session,
            wire,
            console,
            graphics,
            map,
            now_ms: 0,
            kind,
        }
    }

    /// Advance the clock by `ms` and run one routing pass.
    pub fn poll(&mut self, ms: u64) {
        self.now_ms += ms;
        self.session.poll_once(self.now_ms);
    }

    /// Connect, let the session announce itself and clear the wire.
    pub fn connect(&mut self) {
        self.wire.connect();
        self.poll(10);
        self.wire.clear_sent();
    }

    /// Backend command from the companion, routed on the next poll.
    pub fn backend(&mut self, command: &str) {
        let inbound = self.backend_ids().inbound.unwrap();
        self.wire.inject(&inbound, command);
        self.poll(10);
    }

    /// One OTA chunk as the companion puts it on this link: raw bytes on
    /// BLE, hex text on the line-framed transports.
    pub fn ota_chunk(&mut self, chunk: &[u8]) {
        let inbound = self.ota_ids().inbound.unwrap();
        if self.kind.is_line_framed() {
            self.wire.inject(&inbound, encode_chunk(chunk));
        } else {
            self.wire.inject(&inbound, chunk);
        }
        self.poll(10);
    }

    pub fn backend_ids(&self) -> ChannelIds {
        self.wire.registered()[1].clone()
    }

    pub fn ota_ids(&self) -> ChannelIds {
        self.wire.registered()[0].clone()
    }
}

/// An image of `len` bytes that passes the magic-byte check.
#[allow(dead_code)]
pub fn firmware_image(len: usize) -> Vec<u8> {
    let mut img: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
    img[0] = IMAGE_MAGIC;
    img
}

/// Lowercase hex MD5 of `bytes`.
#[allow(dead_code)]
pub fn md5_hex(bytes: &[u8]) -> String {
    use arctic_link::app::ports::DigestAccumulator;
    let mut d = Md5Digest::new();
    d.begin();
    d.add(bytes);
    d.finalize()
}
