//! Arctic link library.
//!
//! One physical transport (BLE, WiFi socket pair or UART) multiplexing
//! named consoles, a plot channel, a map channel and an OTA update channel
//! to the companion application.
//!
//! ```text
//!  Console  Graphics  Map          Ota
//!     │        │       │            │
//!     └────────┴───┬───┴────────────┘
//!                  ▼
//!           SessionContext ──▶ Transport (BLE | socket | serial)
//!                  ▲
//!  io_task ──▶ Session::poll_once ──▶ route by identifier
//! ```
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each adapter; everything else runs on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod link;
pub mod protocol;

pub use channel::{Channel, Console, Graphics, Map};
pub use config::LinkConfig;
pub use error::{Error, Result};
pub use link::{Ota, Session, Transport, TransportKind};
