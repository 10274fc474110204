//! Bidirectional text console.
//!
//! Outbound text goes out either streamed (`printf`, split into frames at
//! the payload limit) or atomic (`singlef`, rejected if over the limit).
//! Inbound commands land in a single-slot mailbox: a second command that
//! arrives before the first is read replaces it.
//!
//! Drain policy is the same on every transport: `available()` stages the
//! pending command and reports whether there was one; `read()` consumes
//! the whole payload.

use std::fmt;

use log::debug;

use super::{Channel, ChannelCore, Mailbox};
use crate::error::SendError;
use crate::link::registry::ChannelKind;
use crate::link::session::Gate;
use crate::protocol::{HIDE, SHOW};

pub struct Console {
    core: ChannelCore,
    inbox: Mailbox<Vec<u8>>,
    staged: Mailbox<Vec<u8>>,
}

impl Console {
    pub fn new(name: &str) -> Self {
        Self {
            core: ChannelCore::new(name),
            inbox: Mailbox::new(),
            staged: Mailbox::new(),
        }
    }

    /// Streamed output, e.g. `console.printf(format_args!("t={}", t))`.
    pub fn printf(&self, args: fmt::Arguments<'_>) -> Result<(), SendError> {
        self.print(&fmt::format(args))
    }

    pub fn print(&self, text: &str) -> Result<(), SendError> {
        self.core.emit_stream(text, Gate::Uplink)
    }

    /// One-shot status line.
    pub fn singlef(&self, args: fmt::Arguments<'_>) -> Result<(), SendError> {
        self.single(&fmt::format(args))
    }

    pub fn single(&self, text: &str) -> Result<(), SendError> {
        self.core.emit(true, text, Gate::Uplink)
    }

    /// Whether a new command arrived since the last call. Clears the flag;
    /// the command stays readable until `read()`.
    pub fn available(&self) -> bool {
        if !self.core.is_connected() {
            return false;
        }
        match self.inbox.take() {
            Some(payload) => {
                self.staged.post(payload);
                true
            }
            None => false,
        }
    }

    /// Consume the newest command. Empty if none is pending.
    pub fn read(&self) -> String {
        String::from_utf8_lossy(&self.read_raw()).into_owned()
    }

    /// Consume the newest command up to (not including) `delim`. The rest
    /// of the payload is discarded.
    pub fn read_until(&self, delim: char) -> String {
        let mut text = self.read();
        if let Some(pos) = text.find(delim) {
            text.truncate(pos);
        }
        text
    }

    /// Consume the newest command without UTF-8 conversion.
    pub fn read_raw(&self) -> Vec<u8> {
        let newest = self.inbox.take();
        let staged = self.staged.take();
        newest.or(staged).unwrap_or_default()
    }

    pub fn hide(&self) -> Result<(), SendError> {
        self.core.emit(true, HIDE, Gate::Uplink)
    }

    pub fn show(&self) -> Result<(), SendError> {
        self.core.emit(true, SHOW, Gate::Uplink)
    }
}

impl Channel for Console {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Console
    }

    fn deliver(&self, payload: Vec<u8>) {
        if self.core.answer_name_query(&payload) {
            return;
        }
        if self.inbox.post(payload) {
            debug!("LINK: '{}' overwrote an unread command", self.core.name());
        }
    }
}
