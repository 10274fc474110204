//! Application channels multiplexed over the active transport.
//!
//! A channel is created once by the application, registered with the
//! [`Session`](crate::link::Session), and started by it. Starting binds the
//! channel to the session context and fixes its identifiers; before that
//! every send fails with [`SendError::NotStarted`].
//!
//! | Channel      | Outbound                         | Inbound            |
//! |--------------|----------------------------------|--------------------|
//! | [`Console`]  | multi-line + single-line text    | commands (mailbox) |
//! | [`Graphics`] | `name:label:value:...` series    | none               |
//! | [`Map`]      | `lat,lon` pairs                  | none               |

mod console;
mod graphics;
mod mailbox;
mod map;

pub use console::Console;
pub use graphics::Graphics;
pub use mailbox::Mailbox;
pub use map::Map;

use std::sync::{Arc, OnceLock};

use crate::command::Command;
use crate::error::{SendError, SessionError};
use crate::link::registry::{ChannelIds, ChannelKind};
use crate::link::session::{Gate, SessionContext};
use crate::protocol::{GET_NAME, REQ_NAME};

/// Behaviour the session needs from every application channel.
pub trait Channel: Send + Sync {
    fn core(&self) -> &ChannelCore;

    fn kind(&self) -> ChannelKind;

    /// Handle one inbound payload addressed to this channel.
    fn deliver(&self, payload: Vec<u8>);

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Bind to a running session. Fails if already bound.
    fn start(&self, ctx: Arc<SessionContext>, ids: ChannelIds) -> Result<(), SessionError> {
        self.core().bind(ctx, ids)
    }

    fn identifiers(&self) -> Option<&ChannelIds> {
        self.core().identifiers()
    }
}

struct Binding {
    ctx: Arc<SessionContext>,
    ids: ChannelIds,
}

/// State shared by every channel kind: its name and, once started, the
/// session binding.
pub struct ChannelCore {
    name: String,
    binding: OnceLock<Binding>,
}

impl ChannelCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            binding: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind(&self, ctx: Arc<SessionContext>, ids: ChannelIds) -> Result<(), SessionError> {
        self.binding
            .set(Binding { ctx, ids })
            .map_err(|_| SessionError::ChannelAlreadyBound)
    }

    pub fn identifiers(&self) -> Option<&ChannelIds> {
        self.binding.get().map(|b| &b.ids)
    }

    pub fn context(&self) -> Option<&Arc<SessionContext>> {
        self.binding.get().map(|b| &b.ctx)
    }

    pub fn is_connected(&self) -> bool {
        self.context().is_some_and(|ctx| ctx.is_connected())
    }

    /// Send one atomic frame. Payloads over the configured maximum are
    /// rejected, never truncated.
    pub fn emit(&self, single: bool, payload: &str, gate: Gate) -> Result<(), SendError> {
        let b = self.binding.get().ok_or(SendError::NotStarted)?;
        if payload.len() > b.ctx.config().max_payload_len {
            return Err(SendError::TooLong);
        }
        b.ctx.transmit(b.ids.outbound(single), payload.as_bytes(), gate)
    }

    /// Send streamed output on the multi-line identifier, split into
    /// consecutive frames at the configured maximum.
    pub fn emit_stream(&self, payload: &str, gate: Gate) -> Result<(), SendError> {
        let b = self.binding.get().ok_or(SendError::NotStarted)?;
        for part in chunk_str(payload, b.ctx.config().max_payload_len) {
            b.ctx.transmit(&b.ids.multi_out, part.as_bytes(), gate)?;
        }
        Ok(())
    }

    /// Answer the reserved name query if `payload` is one.
    pub fn answer_name_query(&self, payload: &[u8]) -> bool {
        let text = String::from_utf8_lossy(payload);
        if Command::parse(&text).base() != GET_NAME {
            return false;
        }
        let reply = format!("{REQ_NAME}:{}", self.name);
        if let Err(e) = self.emit(true, &reply, Gate::Control) {
            log::debug!("LINK: name reply for '{}' dropped: {}", self.name, e);
        }
        true
    }
}

/// Split `s` into pieces of at most `max` bytes on character boundaries.
/// An empty string yields one empty piece.
pub(crate) fn chunk_str(s: &str, max: usize) -> Vec<&str> {
    if s.is_empty() {
        return vec![s];
    }
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        out.push(head);
        rest = tail;
    }
    out
}
