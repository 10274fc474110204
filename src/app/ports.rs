//! Port traits: the hexagonal boundary between the link core and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Session / Channels / OTA (core)
//! ```
//!
//! The BLE stack, UART peripheral, config store, OTA partition writer,
//! digest engine and monotonic clock are consumed only through these
//! traits, so the whole core runs on the host against in-memory
//! implementations.

use std::sync::Arc;

use crate::config::{ConnectionParams, LinkConfig};
use crate::error::ConfigError;

// ───────────────────────────────────────────────────────────────
// GATT server port (BLE peripheral stack)
// ───────────────────────────────────────────────────────────────

/// How the central may access a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Device → central via notifications.
    Notify,
    /// Central → device via write / write-without-response.
    Write,
}

/// One characteristic of a logical service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicSpec<'a> {
    pub uuid: &'a str,
    pub access: Access,
}

/// Receives stack events. Implementations are called from the BLE host
/// task and must not block.
pub trait GattEventSink: Send + Sync {
    fn on_connect(&self);
    fn on_disconnect(&self);
    /// A central wrote `value` to the characteristic `uuid`.
    fn on_write(&self, uuid: &str, value: &[u8]);
}

/// BLE peripheral stack as seen by the transport.
pub trait GattServer: Send {
    /// Install the receiver for connect, disconnect and write events.
    fn set_event_sink(&mut self, sink: Arc<dyn GattEventSink>);

    /// Create an addressable service with its characteristics.
    fn create_service(
        &mut self,
        service: &str,
        characteristics: &[CharacteristicSpec<'_>],
    ) -> Result<(), PortError>;

    /// Bring the stack up and advertise. `params` are applied on connect.
    fn start_advertising(&mut self, params: &ConnectionParams) -> Result<(), PortError>;

    /// Set the characteristic value and notify subscribers.
    fn notify(&mut self, uuid: &str, value: &[u8]) -> Result<(), PortError>;

    /// Number of connected centrals.
    fn connected_count(&self) -> usize;

    /// Drop the current central, if any.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Serial port (UART)
// ───────────────────────────────────────────────────────────────

pub trait SerialPort: Send {
    /// Bytes waiting in the receive FIFO.
    fn bytes_available(&self) -> usize;

    /// Non-blocking read. Returns the number of bytes copied into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<(), PortError>;
}

// ───────────────────────────────────────────────────────────────
// Config store (NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent home of the [`LinkConfig`].
///
/// Implementations MUST validate before persisting.
pub trait ConfigStore {
    /// Stored configuration, or `LinkConfig::default()` if none was saved.
    fn load(&self) -> Result<LinkConfig, ConfigError>;

    fn save(&mut self, config: &LinkConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Firmware write target (OTA partition)
// ───────────────────────────────────────────────────────────────

/// Destination for an incoming firmware image.
pub trait FirmwareTarget: Send {
    /// Open the inactive partition for an image of `size` bytes.
    fn begin(&mut self, size: u32) -> Result<(), FirmwareError>;

    /// Write the next chunk. Returns the number of bytes accepted.
    fn write(&mut self, chunk: &[u8]) -> usize;

    /// All declared bytes have been written.
    fn is_finished(&self) -> bool;

    /// Finalise the image and mark it bootable.
    fn end(&mut self) -> Result<(), FirmwareError>;

    /// Discard a partially written image.
    fn abort(&mut self);

    fn last_error(&self) -> Option<FirmwareError>;
}

/// Failure causes reported by a [`FirmwareTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// Partition smaller than the declared image.
    NoSpace,
    /// Zero size, or more bytes written than declared.
    BadSize,
    /// First byte is not the application image magic.
    MagicByte,
    /// No inactive partition, or the partition API refused to open.
    Begin,
    Write,
    /// Image validation or boot-partition switch failed.
    End,
    /// `write`/`end` without a successful `begin`.
    NotStarted,
}

impl core::fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "not enough space to begin OTA"),
            Self::BadSize => write!(f, "bad size given for the OTA"),
            Self::MagicByte => write!(f, "OTA magic byte is not present"),
            Self::Begin => write!(f, "OTA partition could not be opened"),
            Self::Write => write!(f, "flash write failed"),
            Self::End => write!(f, "image validation failed"),
            Self::NotStarted => write!(f, "no update in progress"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Digest accumulator
// ───────────────────────────────────────────────────────────────

/// Running hash over the received image.
pub trait DigestAccumulator: Send {
    fn begin(&mut self);
    fn add(&mut self, bytes: &[u8]);
    /// Lowercase hex digest of everything added since `begin`.
    fn finalize(&mut self) -> String;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from the GATT and serial ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    Io,
    /// Platform stack returned a non-OK status.
    Stack(i32),
    UnknownCharacteristic,
    InvalidUuid,
}

impl core::fmt::Display for PortError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Stack(code) => write!(f, "stack error ({})", code),
            Self::UnknownCharacteristic => write!(f, "unknown characteristic"),
            Self::InvalidUuid => write!(f, "invalid UUID"),
        }
    }
}
