//! Application boundary.
//!
//! The link core talks to the platform only through the **port traits**
//! defined in [`ports`], keeping routing, channels and OTA fully testable
//! without a radio, a UART or a flash partition.

pub mod ports;
