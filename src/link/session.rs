//! Transport session lifecycle and shared link state.
//!
//! ```text
//!   Uninitialized ──begin()──▶ Configured ──start()──▶ Running
//!                                                       │
//!                                      poll_once(): connect / disconnect edges,
//!                                      readiness, inbound routing, OTA timeout
//! ```
//!
//! [`SessionContext`] is the one piece of state every channel shares: the
//! transport handle, the connection flag and the uplink gate. It is built
//! by `begin()` and handed to each channel by `start()`.
//!
//! The routing task is the only writer of the connection flag. Inbound
//! frames are routed by exact identifier match, OTA first, then the
//! backend, then application channels in registration order; anything
//! unmatched is dropped.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use super::backend::{Backend, DeviceInfo};
use super::codec;
use super::ota::Ota;
use super::registry::{Identifier, Registry};
use super::transport::{Frame, Transport, TransportKind};
use crate::app::ports::{DigestAccumulator, FirmwareTarget};
use crate::channel::Channel;
use crate::config::LinkConfig;
use crate::error::{Error, SendError, SessionError};
use crate::protocol::{INTERFACE_READY, OTA_SETUP};

/// Which gate an outbound frame must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Application data: held back until the companion enables the uplink.
    Uplink,
    /// Handshake replies and acknowledgements: only need a connected peer.
    Control,
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

pub struct SessionContext {
    kind: TransportKind,
    config: LinkConfig,
    device: DeviceInfo,
    connected: AtomicBool,
    uplink: AtomicBool,
    transport: Mutex<Box<dyn Transport>>,
}

impl SessionContext {
    pub fn new(config: LinkConfig, device: DeviceInfo, transport: Box<dyn Transport>) -> Self {
        Self {
            kind: transport.kind(),
            config,
            device,
            connected: AtomicBool::new(false),
            uplink: AtomicBool::new(false),
            transport: Mutex::new(transport),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn uplink_enabled(&self) -> bool {
        self.uplink.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn set_uplink(&self, enabled: bool) {
        self.uplink.store(enabled, Ordering::Release);
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut dyn Transport) -> R) -> R {
        let mut guard = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_mut())
    }

    /// Send one frame if the link state allows it.
    pub fn transmit(&self, id: &str, payload: &[u8], gate: Gate) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        if gate == Gate::Uplink && self.kind.is_uplink_gated() && !self.uplink_enabled() {
            return Err(SendError::UplinkDisabled);
        }
        self.with_transport(|t| {
            if !t.can_deliver() {
                return Err(SendError::NoSubscriber);
            }
            t.send(id, payload).map_err(SendError::from)
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Transport selected, channels may still be added.
    Configured,
    Running,
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Ota,
    Backend,
    Channel(usize),
}

pub struct Session {
    state: SessionState,
    config: LinkConfig,
    device: DeviceInfo,
    ctx: Option<Arc<SessionContext>>,
    channels: Vec<Arc<dyn Channel>>,
    ota: Arc<Ota>,
    backend: Option<Backend>,
    routes: Vec<(Identifier, Route)>,
    inbound: Vec<Frame>,
    was_connected: bool,
    ready_pending: bool,
}

impl Session {
    pub fn new(
        config: LinkConfig,
        device: DeviceInfo,
        target: Box<dyn FirmwareTarget>,
        digest: Box<dyn DigestAccumulator>,
    ) -> Self {
        let ota = Arc::new(Ota::new(target, digest, u64::from(config.ota_timeout_ms)));
        Self {
            state: SessionState::Uninitialized,
            config,
            device,
            ctx: None,
            channels: Vec::new(),
            ota,
            backend: None,
            routes: Vec::new(),
            inbound: Vec::new(),
            was_connected: false,
            ready_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn context(&self) -> Option<&Arc<SessionContext>> {
        self.ctx.as_ref()
    }

    pub fn ota(&self) -> &Arc<Ota> {
        &self.ota
    }

    pub fn channels(&self) -> &[Arc<dyn Channel>] {
        &self.channels
    }

    /// Fix the active transport. The transport's own kind decides the
    /// identifier form and uplink gating.
    pub fn begin(&mut self, transport: Box<dyn Transport>) -> Result<(), Error> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyConfigured.into());
        }
        self.config.validate()?;
        info!("LINK: {} transport selected", transport.kind());
        self.ctx = Some(Arc::new(SessionContext::new(
            self.config.clone(),
            self.device.clone(),
            transport,
        )));
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Register an application channel. Registration order is discovery
    /// order and must match the companion's expectations.
    pub fn add(&mut self, channel: Arc<dyn Channel>) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            return Err(SessionError::AlreadyRunning);
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Allocate identifiers, start every channel and begin advertising or
    /// listening.
    pub fn start(&mut self) -> Result<(), Error> {
        let ctx = match self.state {
            SessionState::Uninitialized => return Err(SessionError::NotConfigured.into()),
            SessionState::Running => return Err(SessionError::AlreadyRunning.into()),
            SessionState::Configured => self.ctx.clone().ok_or(SessionError::NotConfigured)?,
        };

        let mut registry = Registry::new(ctx.kind().identifier_form());
        let mut routes = Vec::new();

        let ota_ids = registry.ota();
        self.ota.start(Arc::clone(&ctx), ota_ids.clone())?;
        ctx.with_transport(|t| t.register(&ota_ids))?;
        if let Some(id) = &ota_ids.inbound {
            routes.push((id.clone(), Route::Ota));
        }

        let backend_ids = registry.backend();
        ctx.with_transport(|t| t.register(&backend_ids))?;
        if let Some(id) = &backend_ids.inbound {
            routes.push((id.clone(), Route::Backend));
        }

        for (index, channel) in self.channels.iter().enumerate() {
            let ids = registry.allocate(channel.kind())?;
            channel.start(Arc::clone(&ctx), ids.clone())?;
            ctx.with_transport(|t| t.register(&ids))?;
            if let Some(id) = &ids.inbound {
                routes.push((id.clone(), Route::Channel(index)));
            }
            debug!("LINK: channel '{}' -> {}", channel.name(), ids.multi_out);
        }

        ctx.with_transport(|t| t.start())?;

        self.routes = routes;
        self.backend = Some(Backend::new(backend_ids));
        self.state = SessionState::Running;
        info!(
            "LINK: session running ({} channels over {})",
            self.channels.len(),
            ctx.kind()
        );
        Ok(())
    }

    /// One routing pass: poll the transport, track connection edges, send
    /// the readiness notice, route inbound frames and service the OTA
    /// timeout. Never blocks on the network.
    pub fn poll_once(&mut self, now_ms: u64) {
        if self.state != SessionState::Running {
            return;
        }
        let Some(ctx) = self.ctx.clone() else {
            return;
        };

        let inbound = &mut self.inbound;
        let connected = ctx.with_transport(|t| {
            t.poll_inbound(now_ms, inbound);
            t.is_connected()
        });

        if connected && !self.was_connected {
            info!("LINK: peer connected ({})", ctx.kind());
            ctx.set_connected(true);
            self.ready_pending = true;
        } else if !connected && self.was_connected {
            info!("LINK: peer disconnected");
            self.drop_peer(&ctx);
        }
        self.was_connected = connected;

        if self.ready_pending {
            self.announce_ready(&ctx);
        }

        let mut frames = core::mem::take(&mut self.inbound);
        for frame in frames.drain(..) {
            self.route(&ctx, frame, now_ms);
        }
        self.inbound = frames;

        self.ota.service(now_ms);
    }

    /// Push the keepalive sentinel if a peer is attached.
    pub fn send_keepalive(&self) {
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        if self.state != SessionState::Running || !ctx.is_connected() {
            return;
        }
        if let Err(e) = ctx.with_transport(|t| t.keepalive()) {
            debug!("LINK: keepalive failed: {}", e);
        }
    }

    /// Tear down the current peer link. Unstable: the companion must
    /// re-handshake from scratch afterwards.
    pub fn disconnect(&mut self) {
        let Some(ctx) = self.ctx.clone() else {
            return;
        };
        warn!("LINK: disconnecting peer");
        ctx.with_transport(|t| t.disconnect());
        self.drop_peer(&ctx);
        self.was_connected = false;
    }

    fn drop_peer(&mut self, ctx: &SessionContext) {
        ctx.set_connected(false);
        ctx.set_uplink(false);
        self.ready_pending = false;
        self.ota.connection_lost();
    }

    fn announce_ready(&mut self, ctx: &SessionContext) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match ctx.transmit(&backend.ids().multi_out, INTERFACE_READY.as_bytes(), Gate::Control) {
            Ok(()) => {
                debug!("LINK: interface ready sent");
                self.ready_pending = false;
            }
            // Peer has not subscribed yet; retry next pass.
            Err(SendError::NoSubscriber) => {}
            Err(e) => debug!("LINK: interface ready not sent: {}", e),
        }
    }

    fn route(&self, ctx: &SessionContext, frame: Frame, now_ms: u64) {
        let Some(route) = self
            .routes
            .iter()
            .find(|(id, _)| *id == frame.id)
            .map(|(_, route)| *route)
        else {
            debug!("LINK: no channel for '{}', dropped", frame.id);
            return;
        };
        match route {
            Route::Ota => match ota_payload(ctx.kind(), &frame.payload) {
                Some(payload) => self.ota.deliver(&payload, now_ms),
                None => warn!(
                    "OTA: {}-byte chunk is not hex, dropped",
                    frame.payload.len()
                ),
            },
            Route::Backend => {
                if let Some(backend) = &self.backend {
                    backend.handle(ctx, &self.channels, &frame.payload);
                }
            }
            Route::Channel(index) => {
                if let Some(channel) = self.channels.get(index) {
                    channel.deliver(frame.payload);
                }
            }
        }
    }
}

/// OTA input as the state machine expects it: setup lines pass through,
/// chunks on line-framed links are unwrapped from hex.
fn ota_payload(kind: TransportKind, payload: &[u8]) -> Option<Cow<'_, [u8]>> {
    if !kind.is_line_framed() || payload.starts_with(OTA_SETUP.as_bytes()) {
        return Some(Cow::Borrowed(payload));
    }
    codec::decode_chunk(payload).map(Cow::Owned)
}
