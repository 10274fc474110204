//! Session backend: commands addressed to the link itself rather than to a
//! channel.
//!
//! | Command                          | Reply                                   |
//! |----------------------------------|-----------------------------------------|
//! | `ARCTIC_COMMAND_GET_DEVICE`      | `name,AA:BB:CC:DD:EE:FF`                |
//! | `ARCTIC_COMMAND_GET_SERVICES`    | `name,id,id,...:name,id,...`            |
//! | `ARCTIC_COMMAND_GET_CONSOLES`    | `name:name:...`                         |
//! | `ARCTIC_COMMAND_ENABLE_UPLINK`   | `DONE` (uplink gate opened)             |
//! | `ARCTIC_COMMAND_DISABLE_UPLINK`  | `DONE` (uplink gate closed)             |
//!
//! Replies go out on the backend's output identifier and bypass the uplink
//! gate. Unknown commands are ignored.

use core::fmt::Write;
use std::sync::Arc;

use log::{debug, info};

use super::registry::ChannelIds;
use super::session::{Gate, SessionContext};
use crate::channel::Channel;
use crate::command::Command;
use crate::protocol::{
    DISABLE_UPLINK, DONE, ENABLE_UPLINK, GET_CONSOLES, GET_DEVICE, GET_SERVICES,
    PRIMARY_DELIMITER, SECONDARY_DELIMITER,
};

/// Identity reported to the companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: heapless::String<32>,
    pub mac: [u8; 6],
}

impl DeviceInfo {
    /// Names longer than 32 bytes are cut at a character boundary.
    pub fn new(name: &str, mac: [u8; 6]) -> Self {
        let mut bounded = heapless::String::new();
        for c in name.chars() {
            if bounded.push(c).is_err() {
                break;
            }
        }
        Self { name: bounded, mac }
    }

    /// `AA:BB:CC:DD:EE:FF`
    pub fn mac_string(&self) -> String {
        let mut out = String::with_capacity(17);
        for (i, b) in self.mac.iter().enumerate() {
            if i > 0 {
                out.push(PRIMARY_DELIMITER);
            }
            let _ = write!(out, "{b:02X}");
        }
        out
    }

    /// Reply body for `GET_DEVICE`.
    pub fn describe(&self) -> String {
        format!("{}{}{}", self.name, SECONDARY_DELIMITER, self.mac_string())
    }
}

pub struct Backend {
    ids: ChannelIds,
}

impl Backend {
    pub fn new(ids: ChannelIds) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &ChannelIds {
        &self.ids
    }

    pub fn handle(&self, ctx: &SessionContext, channels: &[Arc<dyn Channel>], payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        let cmd = Command::parse(&text);
        let reply = match cmd.base() {
            GET_DEVICE => ctx.device().describe(),
            GET_SERVICES => services(channels),
            GET_CONSOLES => names(channels),
            ENABLE_UPLINK => {
                ctx.set_uplink(true);
                info!("LINK: uplink enabled");
                DONE.to_owned()
            }
            DISABLE_UPLINK => {
                ctx.set_uplink(false);
                info!("LINK: uplink disabled");
                DONE.to_owned()
            }
            other => {
                debug!("LINK: unknown backend command '{}'", other);
                return;
            }
        };
        if let Err(e) = ctx.transmit(&self.ids.multi_out, reply.as_bytes(), Gate::Control) {
            debug!("LINK: backend reply dropped: {}", e);
        }
    }
}

/// Every application channel as `name,id,id,...`, channels separated by
/// the primary delimiter.
pub fn services(channels: &[Arc<dyn Channel>]) -> String {
    let mut out = String::new();
    for (i, channel) in channels.iter().enumerate() {
        if i > 0 {
            out.push(PRIMARY_DELIMITER);
        }
        out.push_str(channel.name());
        for id in channel.identifiers().into_iter().flat_map(ChannelIds::iter) {
            out.push(SECONDARY_DELIMITER);
            out.push_str(id);
        }
    }
    out
}

pub fn names(channels: &[Arc<dyn Channel>]) -> String {
    let mut out = String::new();
    for (i, channel) in channels.iter().enumerate() {
        if i > 0 {
            out.push(PRIMARY_DELIMITER);
        }
        out.push_str(channel.name());
    }
    out
}
