//! Location channel: `lat,lon` pairs with six decimal places.

use super::{Channel, ChannelCore};
use crate::error::SendError;
use crate::link::registry::ChannelKind;
use crate::link::session::Gate;
use crate::protocol::{HIDE, SECONDARY_DELIMITER, SHOW};

pub struct Map {
    core: ChannelCore,
}

impl Map {
    pub fn new(name: &str) -> Self {
        Self {
            core: ChannelCore::new(name),
        }
    }

    pub fn location(&self, latitude: f64, longitude: f64) -> Result<(), SendError> {
        let line = format!("{latitude:.6}{SECONDARY_DELIMITER}{longitude:.6}");
        self.core.emit(false, &line, Gate::Uplink)
    }

    pub fn hide(&self) -> Result<(), SendError> {
        self.core.emit(true, HIDE, Gate::Uplink)
    }

    pub fn show(&self) -> Result<(), SendError> {
        self.core.emit(true, SHOW, Gate::Uplink)
    }
}

impl Channel for Map {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Map
    }

    fn deliver(&self, payload: Vec<u8>) {
        let _ = self.core.answer_name_query(&payload);
    }
}
