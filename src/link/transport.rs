//! Transport abstraction: one physical link carrying every logical channel.
//!
//! Concrete implementations:
//! - BLE GATT (one service per channel, notify + write characteristics)
//! - WiFi socket pair (line-delimited text, uplink + downlink)
//! - UART serial (line-delimited text, activity-inferred connection)
//!
//! Session, channel and OTA logic only see this trait, so adding a
//! transport requires zero changes to routing.

use serde::{Deserialize, Serialize};

use super::registry::{ChannelIds, Identifier, IdentifierForm};
use crate::error::TransportError;

/// The three mutually exclusive physical links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Ble,
    Socket,
    Serial,
}

impl TransportKind {
    pub const fn identifier_form(self) -> IdentifierForm {
        match self {
            Self::Ble => IdentifierForm::Long,
            Self::Socket | Self::Serial => IdentifierForm::Short,
        }
    }

    /// Whether application data waits for `ENABLE_UPLINK`. BLE peers
    /// subscribe per characteristic, so they are gated by subscription
    /// instead.
    pub const fn is_uplink_gated(self) -> bool {
        !matches!(self, Self::Ble)
    }

    /// Whether frames travel as `id:payload\n` lines. Such payloads cannot
    /// carry `\n`, so OTA chunks are hex-encoded on these links.
    pub const fn is_line_framed(self) -> bool {
        matches!(self, Self::Socket | Self::Serial)
    }
}

impl core::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Ble => write!(f, "BLE"),
            Self::Socket => write!(f, "socket"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

/// One inbound frame: the identifier it was addressed to plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: Identifier,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(id: &str, payload: &[u8]) -> Option<Self> {
        let mut ident = Identifier::new();
        ident.push_str(id).ok()?;
        Some(Self {
            id: ident,
            payload: payload.to_vec(),
        })
    }
}

/// Capability interface implemented by every physical link.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Declare a logical channel. Called once per channel before `start`.
    fn register(&mut self, ids: &ChannelIds) -> Result<(), TransportError>;

    /// Begin advertising or listening.
    fn start(&mut self) -> Result<(), TransportError>;

    /// Emit `payload` addressed to `id`.
    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Move every frame received since the last call into `out`, and update
    /// connection status. Never blocks.
    fn poll_inbound(&mut self, now_ms: u64, out: &mut Vec<Frame>);

    fn is_connected(&self) -> bool;

    /// Whether a send would reach a peer right now.
    fn can_deliver(&self) -> bool {
        self.is_connected()
    }

    /// Push the keepalive sentinel on an idle link.
    fn keepalive(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Tear down the current peer link.
    fn disconnect(&mut self);
}

/// A transport that is never connected and discards all writes.
pub struct NullTransport {
    kind: TransportKind,
}

impl NullTransport {
    pub const fn new(kind: TransportKind) -> Self {
        Self { kind }
    }
}

impl Transport for NullTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn register(&mut self, _ids: &ChannelIds) -> Result<(), TransportError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, _id: &str, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    fn poll_inbound(&mut self, _now_ms: u64, _out: &mut Vec<Frame>) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn disconnect(&mut self) {}
}
