//! Channel identifier assignment.
//!
//! Identifiers are allocated when the session starts, in registration
//! order, and never change afterwards. The companion discovers channels in
//! the same order, so both sides must agree on it.
//!
//! ## Long form (BLE)
//!
//! 128-bit UUID strings templated by a per-kind index `n`:
//!
//! | Role             | UUID                                       |
//! |------------------|--------------------------------------------|
//! | scope (service)  | `4fafc201-1fb5-459e-K{n:03x}-c5c9c3319f{n:02x}` |
//! | multi-line out   | `4fafc201-1fb5-459e-K{n:03x}-c5c9c3319a{n:02x}` |
//! | single-line out  | `4fafc201-1fb5-459e-K{n:03x}-c5c9c3319b{n:02x}` |
//! | inbound          | `4fafc201-1fb5-459e-K{n:03x}-c5c9c3319c{n:02x}` |
//!
//! `K` is 3 (console), 4 (graphics) or 5 (map). The backend (`1000`) and
//! OTA (`2000`) services are fixed and use `9a00` out / `9b00` in.
//!
//! ## Short form (socket, serial)
//!
//! Three-letter role tag plus two lowercase hex digits, e.g. `RXM00`.

use core::fmt::Write;

use crate::error::RegistryError;

/// A per-transport channel address. Fits a 36-char UUID.
pub type Identifier = heapless::String<36>;

/// Highest index representable in two hex digits.
pub const MAX_INDEX: u16 = 0xFF;

const UUID_PREFIX: &str = "4fafc201-1fb5-459e";
const UUID_NODE: &str = "c5c9c3319";

/// How identifiers are spelled on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierForm {
    Long,
    Short,
}

type Tags = (&'static str, &'static str, Option<&'static str>, Option<&'static str>);

/// Application channel kinds. Each kind has its own index counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Console,
    Graphics,
    Map,
}

impl ChannelKind {
    const fn slot(self) -> usize {
        match self {
            Self::Console => 0,
            Self::Graphics => 1,
            Self::Map => 2,
        }
    }

    const fn uuid_digit(self) -> char {
        match self {
            Self::Console => '3',
            Self::Graphics => '4',
            Self::Map => '5',
        }
    }

    /// Short-form tags for scope, multi-out, single-out and inbound.
    const fn tags(self) -> Tags {
        match self {
            Self::Console => ("ATS", "TXM", Some("TXS"), Some("RXM")),
            Self::Graphics => ("GRS", "GRM", None, None),
            Self::Map => ("MPS", "MPM", None, None),
        }
    }
}

/// The identifiers one channel owns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelIds {
    /// Addressing scope (BLE service).
    pub scope: Identifier,
    /// Multi-line / streamed output.
    pub multi_out: Identifier,
    /// Single-line / atomic output.
    pub single_out: Option<Identifier>,
    /// Inbound commands.
    pub inbound: Option<Identifier>,
}

impl ChannelIds {
    /// Every identifier in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        [Some(&self.scope), Some(&self.multi_out)]
            .into_iter()
            .chain([self.single_out.as_ref(), self.inbound.as_ref()])
            .flatten()
    }

    /// Output identifier for a send; single-line falls back to multi-line
    /// on channels that have no separate single-line stream.
    pub fn outbound(&self, single: bool) -> &Identifier {
        if single {
            self.single_out.as_ref().unwrap_or(&self.multi_out)
        } else {
            &self.multi_out
        }
    }

    pub fn owns(&self, id: &str) -> bool {
        self.iter().any(|own| own.as_str() == id)
    }
}

/// Per-transport identifier allocator.
#[derive(Debug)]
pub struct Registry {
    form: IdentifierForm,
    next: [u16; 3],
}

impl Registry {
    pub const fn new(form: IdentifierForm) -> Self {
        Self { form, next: [0; 3] }
    }

    pub fn form(&self) -> IdentifierForm {
        self.form
    }

    /// Allocate the next identifier set for a channel of `kind`.
    pub fn allocate(&mut self, kind: ChannelKind) -> Result<ChannelIds, RegistryError> {
        let index = self.next[kind.slot()];
        if index > MAX_INDEX {
            return Err(RegistryError::Exhausted);
        }
        self.next[kind.slot()] = index + 1;

        let ids = match self.form {
            IdentifierForm::Long => long_ids(kind, index),
            IdentifierForm::Short => short_ids(kind, index),
        };
        Ok(ids)
    }

    /// Fixed identifiers of the session backend channel.
    pub fn backend(&self) -> ChannelIds {
        match self.form {
            IdentifierForm::Long => fixed_long("1000"),
            IdentifierForm::Short => fixed_short(["SYS", "SYT", "SYR"]),
        }
    }

    /// Fixed identifiers of the OTA channel.
    pub fn ota(&self) -> ChannelIds {
        match self.form {
            IdentifierForm::Long => fixed_long("2000"),
            IdentifierForm::Short => fixed_short(["OTS", "OTT", "OTR"]),
        }
    }
}

fn uuid(group: &str, role: &str, index: u16) -> Identifier {
    let mut id = Identifier::new();
    let _ = write!(id, "{UUID_PREFIX}-{group}-{UUID_NODE}{role}{index:02x}");
    id
}

fn long_ids(kind: ChannelKind, index: u16) -> ChannelIds {
    let mut group = heapless::String::<4>::new();
    let _ = write!(group, "{}{:03x}", kind.uuid_digit(), index);
    let (_, _, single, inbound) = kind.tags();
    ChannelIds {
        scope: uuid(&group, "f", index),
        multi_out: uuid(&group, "a", index),
        single_out: single.map(|_| uuid(&group, "b", index)),
        inbound: inbound.map(|_| uuid(&group, "c", index)),
    }
}

fn short(tag: &str, index: u16) -> Identifier {
    let mut id = Identifier::new();
    let _ = write!(id, "{tag}{index:02x}");
    id
}

fn short_ids(kind: ChannelKind, index: u16) -> ChannelIds {
    let (scope, multi, single, inbound) = kind.tags();
    ChannelIds {
        scope: short(scope, index),
        multi_out: short(multi, index),
        single_out: single.map(|tag| short(tag, index)),
        inbound: inbound.map(|tag| short(tag, index)),
    }
}

fn fixed_long(group: &str) -> ChannelIds {
    ChannelIds {
        scope: uuid(group, "f", 0),
        multi_out: uuid(group, "a", 0),
        single_out: None,
        inbound: Some(uuid(group, "b", 0)),
    }
}

fn fixed_short([scope, out, inbound]: [&str; 3]) -> ChannelIds {
    ChannelIds {
        scope: short(scope, 0),
        multi_out: short(out, 0),
        single_out: None,
        inbound: Some(short(inbound, 0)),
    }
}

/// Parse a canonical 8-4-4-4-12 UUID string into its 128-bit value.
pub fn uuid128(id: &str) -> Option<u128> {
    let groups: Vec<&str> = id.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    if groups.len() != 5 || groups.iter().zip(lengths).any(|(g, len)| g.len() != len) {
        return None;
    }
    let mut value: u128 = 0;
    for c in groups.iter().flat_map(|g| g.chars()) {
        value = (value << 4) | u128::from(c.to_digit(16)?);
    }
    Some(value)
}
