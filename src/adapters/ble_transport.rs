//! BLE transport: one GATT service per logical channel.
//!
//! Each registered [`ChannelIds`] becomes a primary service whose UUID is
//! the channel scope:
//!
//! | Identifier  | Characteristic access |
//! |-------------|-----------------------|
//! | multi-out   | Notify                |
//! | single-out  | Notify                |
//! | inbound     | Write                 |
//!
//! Stack callbacks arrive on the BLE host task. They only touch the
//! shared connection flag and push into a bounded `embassy-sync` channel;
//! the link task drains that channel from `poll_inbound`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::ports::{Access, CharacteristicSpec, GattEventSink, GattServer};
use crate::config::ConnectionParams;
use crate::error::TransportError;
use crate::link::registry::ChannelIds;
use crate::link::transport::{Frame, Transport, TransportKind};

/// Inbound writes buffered between two link polls.
pub const INBOUND_DEPTH: usize = 16;

struct BleShared {
    connected: AtomicBool,
    inbound: Channel<CriticalSectionRawMutex, Frame, INBOUND_DEPTH>,
}

/// Stack-side half: receives GATT callbacks.
struct BleEvents(Arc<BleShared>);

impl GattEventSink for BleEvents {
    fn on_connect(&self) {
        info!("BLE: central connected");
        self.0.connected.store(true, Ordering::Release);
    }

    fn on_disconnect(&self) {
        info!("BLE: central disconnected");
        self.0.connected.store(false, Ordering::Release);
    }

    fn on_write(&self, uuid: &str, value: &[u8]) {
        let Some(frame) = Frame::new(uuid, value) else {
            return;
        };
        if self.0.inbound.try_send(frame).is_err() {
            warn!("BLE: inbound queue full, write to {} dropped", uuid);
        }
    }
}

pub struct BleTransport<G: GattServer> {
    gatt: G,
    shared: Arc<BleShared>,
    params: ConnectionParams,
    started: bool,
}

impl<G: GattServer> BleTransport<G> {
    pub fn new(mut gatt: G, params: ConnectionParams) -> Self {
        let shared = Arc::new(BleShared {
            connected: AtomicBool::new(false),
            inbound: Channel::new(),
        });
        gatt.set_event_sink(Arc::new(BleEvents(Arc::clone(&shared))));
        Self {
            gatt,
            shared,
            params,
            started: false,
        }
    }
}

impl<G: GattServer> Transport for BleTransport<G> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn register(&mut self, ids: &ChannelIds) -> Result<(), TransportError> {
        let mut chars = vec![CharacteristicSpec {
            uuid: &ids.multi_out,
            access: Access::Notify,
        }];
        if let Some(single) = &ids.single_out {
            chars.push(CharacteristicSpec {
                uuid: single,
                access: Access::Notify,
            });
        }
        if let Some(inbound) = &ids.inbound {
            chars.push(CharacteristicSpec {
                uuid: inbound,
                access: Access::Write,
            });
        }
        self.gatt.create_service(&ids.scope, &chars)?;
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        self.gatt.start_advertising(&self.params)?;
        self.started = true;
        Ok(())
    }

    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        self.gatt.notify(id, payload)?;
        Ok(())
    }

    fn poll_inbound(&mut self, _now_ms: u64, out: &mut Vec<Frame>) {
        while let Ok(frame) = self.shared.inbound.try_receive() {
            out.push(frame);
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn can_deliver(&self) -> bool {
        self.is_connected() && self.gatt.connected_count() > 0
    }

    fn disconnect(&mut self) {
        self.gatt.disconnect();
    }
}
