//! Transport multiplexing and session management.
//!
//! ```text
//!   Console / Graphics / Map ──┐
//!                              ├─▶ SessionContext ──▶ dyn Transport ──▶ BLE | socket | UART
//!   OTA ───────────────────────┘        ▲
//!                                       │ inbound frames
//!   io_task ──▶ Session::poll_once ─────┘ (route by identifier, OTA first)
//! ```

pub mod backend;
pub mod codec;
pub mod io_task;
pub mod ota;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::DeviceInfo;
pub use ota::{Ota, OtaOutcome, OtaState};
pub use registry::{ChannelIds, ChannelKind, Identifier, IdentifierForm, Registry};
pub use session::{Gate, Session, SessionContext, SessionState};
pub use transport::{Frame, NullTransport, Transport, TransportKind};
