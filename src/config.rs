//! Link configuration parameters.
//!
//! All tunables for the Arctic link. Persisted in NVS as a postcard blob
//! (see `adapters::nvs`); the defaults match the companion application's
//! defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::link::TransportKind;

/// Default advertised BLE name and backend device name.
pub const DEFAULT_DEVICE_NAME: &str = "ArcticTerminal";

/// Default uplink TCP port; the downlink listens on `port + 1`.
pub const DEFAULT_SOCKET_PORT: u16 = 13200;

pub const DEFAULT_BAUD: u32 = 115_200;

/// Largest ATT MTU requested from the central.
pub const DEFAULT_BLE_MTU: u16 = 512;

/// BLE connection-parameter presets, applied on every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionProfile {
    #[default]
    HighSpeed,
    Balanced,
    PowerSaving,
    LongRange,
    MaxSpeed,
}

/// Connection interval bounds (1.25 ms units) and supervision timeout
/// (10 ms units), as the GAP layer expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    pub min_interval: u16,
    pub max_interval: u16,
    pub supervision_timeout: u16,
    pub mtu: u16,
}

impl ConnectionProfile {
    pub const fn params(self, mtu: u16) -> ConnectionParams {
        let (min_interval, max_interval, supervision_timeout) = match self {
            Self::HighSpeed => (10, 16, 100),
            Self::Balanced => (24, 40, 200),
            Self::PowerSaving => (80, 100, 300),
            Self::LongRange => (160, 200, 400),
            Self::MaxSpeed => (6, 8, 50),
        };
        ConnectionParams {
            min_interval,
            max_interval,
            supervision_timeout,
            mtu,
        }
    }
}

/// Core link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- Identity ---
    /// Advertised name, reported by `GET_DEVICE`
    pub device_name: heapless::String<32>,

    // --- Transport ---
    /// Transport selected at boot
    pub transport: TransportKind,
    /// Uplink TCP port (device → companion)
    pub socket_port: u16,
    /// UART baud rate
    pub serial_baud: u32,
    /// BLE connection profile
    pub ble_profile: ConnectionProfile,
    /// Requested ATT MTU
    pub ble_mtu: u16,

    // --- Timing ---
    /// Routing task poll period (milliseconds)
    pub poll_interval_ms: u32,
    /// Keepalive period on the socket uplink (milliseconds)
    pub keepalive_interval_ms: u32,
    /// Serial link is considered down after this much silence (milliseconds)
    pub serial_activity_timeout_ms: u32,
    /// OTA inactivity window (milliseconds)
    pub ota_timeout_ms: u32,

    // --- Framing ---
    /// Longest payload sent in one frame (bytes)
    pub max_payload_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str(DEFAULT_DEVICE_NAME);
        Self {
            device_name,

            transport: TransportKind::Ble,
            socket_port: DEFAULT_SOCKET_PORT,
            serial_baud: DEFAULT_BAUD,
            ble_profile: ConnectionProfile::HighSpeed,
            ble_mtu: DEFAULT_BLE_MTU,

            poll_interval_ms: 10,
            keepalive_interval_ms: 2_000,
            serial_activity_timeout_ms: 10_000,
            ota_timeout_ms: 5_000,

            max_payload_len: 512,
        }
    }
}

impl LinkConfig {
    /// Check invariants the session relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::EmptyDeviceName);
        }
        if self.socket_port == u16::MAX {
            return Err(ConfigError::InvalidPort);
        }
        if self.poll_interval_ms == 0
            || self.keepalive_interval_ms == 0
            || self.serial_activity_timeout_ms == 0
            || self.ota_timeout_ms == 0
            || self.serial_baud == 0
        {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_payload_len < 32 {
            return Err(ConfigError::PayloadTooSmall);
        }
        Ok(())
    }

    /// Downlink (companion → device) port.
    pub fn downlink_port(&self) -> u16 {
        self.socket_port.saturating_add(1)
    }

    pub fn connection_params(&self) -> ConnectionParams {
        self.ble_profile.params(self.ble_mtu)
    }

    /// Validated postcard encoding, as stored in NVS.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        self.validate()?;
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Decode and validate a stored blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }
}
