//! Line-delimited frame codec for the socket and serial transports.
//!
//! Wire format:
//! ```text
//! ┌────────────┬───┬───────────────┬────┐
//! │ identifier │ : │ payload bytes │ \n │
//! └────────────┴───┴───────────────┴────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete lines. This
//! handles partial reads: a single read may return part of a line, or
//! several lines concatenated. Only the `\n` terminator is consumed; every
//! other byte, `\r` included, reaches the payload unchanged.
//!
//! A payload can never contain `\n`, so binary OTA chunks cross these
//! transports hex-encoded (`OTR00:e9010203\n`, either case). Setup lines
//! and every other channel stay plain text.

use super::transport::Frame;
use crate::protocol::{LINE_TERMINATOR, PRIMARY_DELIMITER};

/// Longest accepted line (protects against memory exhaustion).
pub const MAX_LINE_LEN: usize = 4096;

/// Streaming line decoder.
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Set while discarding the tail of an over-long line.
    overflowed: bool,
    max_len: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
            max_len,
        }
    }

    /// Feed bytes; every completed line is passed to `on_line` without its
    /// terminator.
    pub fn feed(&mut self, data: &[u8], mut on_line: impl FnMut(&[u8])) {
        for &byte in data {
            if byte == LINE_TERMINATOR {
                if !self.overflowed {
                    on_line(&self.buf);
                }
                self.buf.clear();
                self.overflowed = false;
                continue;
            }
            if self.overflowed {
                continue;
            }
            if self.buf.len() >= self.max_len {
                log::warn!("CODEC: line exceeds {} bytes, discarding", self.max_len);
                self.buf.clear();
                self.overflowed = true;
                continue;
            }
            self.buf.push(byte);
        }
    }

    /// Bytes of the current incomplete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Reset decoder state (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a line on the first primary delimiter. Lines without one, or with
/// an identifier that is not valid UTF-8 or too long, are not routable.
pub fn split_frame(line: &[u8]) -> Option<Frame> {
    let pos = line.iter().position(|&b| b == PRIMARY_DELIMITER as u8)?;
    let id = core::str::from_utf8(&line[..pos]).ok()?;
    Frame::new(id, &line[pos + 1..])
}

/// Encode `id:payload\n`.
pub fn encode_frame(id: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(id.len() + payload.len() + 2);
    out.extend_from_slice(id.as_bytes());
    out.push(PRIMARY_DELIMITER as u8);
    out.extend_from_slice(payload);
    out.push(LINE_TERMINATOR);
    out
}

/// Hex text for one OTA chunk on a line-framed transport.
pub fn encode_chunk(chunk: &[u8]) -> Vec<u8> {
    hex::encode(chunk).into_bytes()
}

/// Raw bytes of a hex-encoded OTA chunk; `None` if the payload is not an
/// even run of hex digits.
pub fn decode_chunk(payload: &[u8]) -> Option<Vec<u8>> {
    hex::decode(payload).ok()
}
