//! Unified error types for the Arctic link.
//!
//! Every subsystem owns a small `Copy` error enum; all of them funnel into
//! [`Error`] so the firmware binary can handle failures uniformly.
//! Wire-level failures (malformed frames, unknown identifiers) are never
//! errors: they are dropped silently by the router.

use core::fmt;

use crate::app::ports::{FirmwareError, PortError};

// ---------------------------------------------------------------------------
// Top-level link error
// ---------------------------------------------------------------------------

/// Every fallible link operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transport could not be initialised or written.
    Transport(TransportError),
    /// Identifier allocation failed.
    Registry(RegistryError),
    /// A lifecycle call arrived in the wrong session state.
    Session(SessionError),
    /// An outbound channel send was suppressed.
    Send(SendError),
    /// The OTA state machine rejected an operation.
    Ota(OtaError),
    /// Configuration failed validation.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Send(e) => write!(f, "send: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No peer is attached to the link.
    NotConnected,
    /// `send` was called before `start`.
    NotStarted,
    /// Socket or UART I/O failed.
    Io,
    /// Listener could not be bound.
    Bind,
    /// The BLE stack returned an error code.
    Stack(i32),
    /// The identifier was never registered with this transport.
    UnknownIdentifier,
    /// The identifier is not a valid address for this transport.
    InvalidIdentifier,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no peer connected"),
            Self::NotStarted => write!(f, "transport not started"),
            Self::Io => write!(f, "I/O error"),
            Self::Bind => write!(f, "could not bind listener"),
            Self::Stack(code) => write!(f, "BLE stack error ({code})"),
            Self::UnknownIdentifier => write!(f, "identifier not registered"),
            Self::InvalidIdentifier => write!(f, "identifier malformed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<PortError> for TransportError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Io => Self::Io,
            PortError::Stack(code) => Self::Stack(code),
            PortError::UnknownCharacteristic => Self::UnknownIdentifier,
            PortError::InvalidUuid => Self::InvalidIdentifier,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// More than 256 channels of one kind were registered.
    Exhausted,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "identifier index exceeds 0xFF"),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// `begin` was called twice.
    AlreadyConfigured,
    /// `start` was called before `begin`.
    NotConfigured,
    /// The session is already running; channels can no longer be added.
    AlreadyRunning,
    /// A channel was started by a second session.
    ChannelAlreadyBound,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConfigured => write!(f, "transport already selected"),
            Self::NotConfigured => write!(f, "begin() must be called before start()"),
            Self::AlreadyRunning => write!(f, "session already running"),
            Self::ChannelAlreadyBound => write!(f, "channel already started"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Send errors
// ---------------------------------------------------------------------------

/// Why an outbound send produced no wire output.
///
/// The wire contract treats all of these as silent no-ops; the variants
/// exist so callers and tests can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The channel has not been started by a session.
    NotStarted,
    NotConnected,
    /// BLE peer connected but nobody is subscribed.
    NoSubscriber,
    /// The companion has not sent `ENABLE_UPLINK`.
    UplinkDisabled,
    /// Single-line payload exceeds the configured maximum.
    TooLong,
    /// Plot value count does not match its registered labels.
    LabelMismatch,
    /// `plot` was called for a name never passed to `setup`.
    UnknownPlot,
    Transport(TransportError),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "channel not started"),
            Self::NotConnected => write!(f, "not connected"),
            Self::NoSubscriber => write!(f, "no subscriber"),
            Self::UplinkDisabled => write!(f, "uplink disabled"),
            Self::TooLong => write!(f, "payload exceeds maximum length"),
            Self::LabelMismatch => write!(f, "value count does not match labels"),
            Self::UnknownPlot => write!(f, "plot not configured"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

impl From<TransportError> for SendError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// `-s` missing, zero or not a number.
    InvalidSize,
    /// `-md5` missing or not 32 hex digits.
    InvalidDigest,
    /// The firmware target refused to open.
    Begin(FirmwareError),
    /// The target accepted fewer bytes than were received.
    ShortWrite,
    /// A chunk would exceed the declared image size.
    Overflow,
    DigestMismatch,
    /// The target failed to finalise the image.
    End(FirmwareError),
    ConnectionLost,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "invalid image size"),
            Self::InvalidDigest => write!(f, "invalid MD5 digest"),
            Self::Begin(e) => write!(f, "begin failed: {e}"),
            Self::ShortWrite => write!(f, "short write to firmware target"),
            Self::Overflow => write!(f, "chunk exceeds declared image size"),
            Self::DigestMismatch => write!(f, "MD5 hash does not match"),
            Self::End(e) => write!(f, "end failed: {e}"),
            Self::ConnectionLost => write!(f, "connection lost during transfer"),
        }
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    EmptyDeviceName,
    /// Uplink and downlink ports would collide or overflow.
    InvalidPort,
    ZeroInterval,
    /// Maximum payload length below the smallest useful frame.
    PayloadTooSmall,
    /// Stored bytes do not decode to a configuration.
    Corrupted,
    /// The persistent store refused a read or write.
    Storage,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDeviceName => write!(f, "device name must not be empty"),
            Self::InvalidPort => write!(f, "socket port must leave room for port + 1"),
            Self::ZeroInterval => write!(f, "intervals and timeouts must be non-zero"),
            Self::PayloadTooSmall => write!(f, "max payload length below 32 bytes"),
            Self::Corrupted => write!(f, "stored config does not decode"),
            Self::Storage => write!(f, "config storage unavailable"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
