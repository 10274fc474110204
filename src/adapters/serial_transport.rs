//! UART serial transport: line-delimited frames over one byte stream.
//!
//! Serial has no connect/disconnect event. The link counts as connected
//! while bytes keep arriving; silence longer than the activity timeout
//! drops it. The companion's keepalive traffic keeps it up.

use log::{debug, info, warn};

use crate::app::ports::SerialPort;
use crate::error::TransportError;
use crate::link::codec::{LineDecoder, encode_frame, split_frame};
use crate::link::registry::ChannelIds;
use crate::link::transport::{Frame, Transport, TransportKind};

const READ_CHUNK: usize = 256;

pub struct SerialTransport<P: SerialPort> {
    port: P,
    decoder: LineDecoder,
    activity_timeout_ms: u64,
    last_rx_ms: Option<u64>,
    connected: bool,
    started: bool,
}

impl<P: SerialPort> SerialTransport<P> {
    pub fn new(port: P, activity_timeout_ms: u32) -> Self {
        Self {
            port,
            decoder: LineDecoder::new(),
            activity_timeout_ms: u64::from(activity_timeout_ms),
            last_rx_ms: None,
            connected: false,
            started: false,
        }
    }

    fn read_available(&mut self, out: &mut Vec<Frame>) -> bool {
        let mut got_bytes = false;
        let mut buf = [0u8; READ_CHUNK];
        while self.port.bytes_available() > 0 {
            let n = match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("UART: read failed: {}", e);
                    break;
                }
            };
            got_bytes = true;
            self.decoder.feed(&buf[..n], |line| match split_frame(line) {
                Some(frame) => out.push(frame),
                None => debug!("UART: line without identifier dropped"),
            });
        }
        got_bytes
    }
}

impl<P: SerialPort> Transport for SerialTransport<P> {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn register(&mut self, _ids: &ChannelIds) -> Result<(), TransportError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        self.started = true;
        info!("UART: link started");
        Ok(())
    }

    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        self.port.write(&encode_frame(id, payload))?;
        Ok(())
    }

    fn poll_inbound(&mut self, now_ms: u64, out: &mut Vec<Frame>) {
        if !self.started {
            return;
        }
        if self.read_available(out) {
            self.last_rx_ms = Some(now_ms);
            if !self.connected {
                info!("UART: companion active");
            }
            self.connected = true;
        } else if self.connected
            && self
                .last_rx_ms
                .is_some_and(|t| now_ms.saturating_sub(t) > self.activity_timeout_ms)
        {
            info!("UART: no traffic for {}ms, link down", self.activity_timeout_ms);
            self.connected = false;
            self.decoder.reset();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.last_rx_ms = None;
        self.decoder.reset();
    }
}
