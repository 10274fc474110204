//! In-memory transport for unit tests.

use std::sync::{Arc, Mutex};

use super::registry::ChannelIds;
use super::transport::{Frame, Transport, TransportKind};
use crate::error::TransportError;

#[derive(Default)]
struct Wire {
    connected: bool,
    unsubscribed: bool,
    started: bool,
    inbound: Vec<Frame>,
    sent: Vec<(String, String)>,
    registered: Vec<ChannelIds>,
    keepalives: usize,
}

/// Test-side handle onto the recording transport.
#[derive(Clone)]
pub struct WireHandle(Arc<Mutex<Wire>>);

impl WireHandle {
    fn with<R>(&self, f: impl FnOnce(&mut Wire) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    pub fn set_connected(&self, connected: bool) {
        self.with(|w| w.connected = connected);
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.with(|w| w.unsubscribed = !subscribed);
    }

    pub fn is_connected(&self) -> bool {
        self.with(|w| w.connected)
    }

    pub fn started(&self) -> bool {
        self.with(|w| w.started)
    }

    pub fn inject(&self, id: &str, payload: impl AsRef<[u8]>) {
        let frame = Frame::new(id, payload.as_ref()).unwrap();
        self.with(|w| w.inbound.push(frame));
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.with(|w| w.sent.clone())
    }

    pub fn sent_to(&self, id: &str) -> Vec<String> {
        self.with(|w| {
            w.sent
                .iter()
                .filter(|(to, _)| to == id)
                .map(|(_, payload)| payload.clone())
                .collect()
        })
    }

    pub fn take_sent(&self) -> Vec<(String, String)> {
        self.with(|w| core::mem::take(&mut w.sent))
    }

    pub fn registered(&self) -> Vec<ChannelIds> {
        self.with(|w| w.registered.clone())
    }

    pub fn keepalives(&self) -> usize {
        self.with(|w| w.keepalives)
    }
}

pub struct RecordingTransport {
    kind: TransportKind,
    wire: WireHandle,
}

impl RecordingTransport {
    pub fn new(kind: TransportKind) -> (Self, WireHandle) {
        let wire = WireHandle(Arc::new(Mutex::new(Wire::default())));
        (
            Self {
                kind,
                wire: wire.clone(),
            },
            wire,
        )
    }
}

impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn register(&mut self, ids: &ChannelIds) -> Result<(), TransportError> {
        self.wire.with(|w| w.registered.push(ids.clone()));
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        self.wire.with(|w| w.started = true);
        Ok(())
    }

    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.wire.with(|w| {
            if !w.connected {
                return Err(TransportError::NotConnected);
            }
            w.sent
                .push((id.to_owned(), String::from_utf8_lossy(payload).into_owned()));
            Ok(())
        })
    }

    fn poll_inbound(&mut self, _now_ms: u64, out: &mut Vec<Frame>) {
        self.wire.with(|w| out.append(&mut w.inbound));
    }

    fn is_connected(&self) -> bool {
        self.wire.is_connected()
    }

    fn can_deliver(&self) -> bool {
        self.wire.with(|w| w.connected && !w.unsubscribed)
    }

    fn keepalive(&mut self) -> Result<(), TransportError> {
        self.wire.with(|w| w.keepalives += 1);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.wire.set_connected(false);
    }
}
