//! Wire vocabulary shared by the session, channels and OTA.
//!
//! Socket and serial frames are ASCII lines:
//!
//! ```text
//! <identifier>:<payload>\n
//! ```
//!
//! Multi-value payloads separate fields with `,`; service enumeration
//! separates services with `:`.

use core::fmt;

pub const PRIMARY_DELIMITER: char = ':';
pub const SECONDARY_DELIMITER: char = ',';
pub const LINE_TERMINATOR: u8 = b'\n';

/// Sent on an idle uplink so the companion can detect a dead connection.
pub const KEEPALIVE: &str = "0";

// ── Session backend commands ─────────────────────────────────

pub const GET_DEVICE: &str = "ARCTIC_COMMAND_GET_DEVICE";
pub const GET_SERVICES: &str = "ARCTIC_COMMAND_GET_SERVICES";
pub const GET_CONSOLES: &str = "ARCTIC_COMMAND_GET_CONSOLES";
pub const ENABLE_UPLINK: &str = "ARCTIC_COMMAND_ENABLE_UPLINK";
pub const DISABLE_UPLINK: &str = "ARCTIC_COMMAND_DISABLE_UPLINK";
pub const INTERFACE_READY: &str = "ARCTIC_COMMAND_INTERFACE_READY";

/// Reply to the uplink toggles.
pub const DONE: &str = "DONE";

// ── Per-channel commands ─────────────────────────────────────

pub const GET_NAME: &str = "ARCTIC_COMMAND_GET_NAME";
pub const REQ_NAME: &str = "ARCTIC_COMMAND_REQ_NAME";
pub const HIDE: &str = "ARCTIC_COMMAND_HIDE";
pub const SHOW: &str = "ARCTIC_COMMAND_SHOW";

// ── OTA ──────────────────────────────────────────────────────

pub const OTA_SETUP: &str = "ARCTIC_COMMAND_OTA_SETUP";
pub const OTA_SIZE_FLAG: &str = "-s";
pub const OTA_DIGEST_FLAG: &str = "-md5";

/// OTA acknowledgement kinds, rendered as `KIND[counter]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ready,
    Ack,
    Done,
    Error,
    Timeout,
}

impl AckKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Ack => "ACK",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Render the tagged acknowledgement line, e.g. `ACK[3]`.
    pub fn tagged(self, counter: u32) -> String {
        format!("{}[{}]", self.as_str(), counter)
    }
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
