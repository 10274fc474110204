//! WiFi socket transport: a listener pair carrying line-delimited frames.
//!
//! | Port       | Direction          | Role                        |
//! |------------|--------------------|-----------------------------|
//! | `port`     | device → companion | uplink, drives `connected`  |
//! | `port + 1` | companion → device | downlink, polled for lines  |
//!
//! Both listeners and the downlink stream are non-blocking, so
//! `poll_inbound` never stalls the link task. The uplink stream is
//! blocking with a write timeout. Port 0 binds both listeners to
//! ephemeral ports (host tests).

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::TransportError;
use crate::link::codec::{LineDecoder, encode_frame, split_frame};
use crate::link::registry::ChannelIds;
use crate::link::transport::{Frame, Transport, TransportKind};
use crate::protocol::{KEEPALIVE, LINE_TERMINATOR};

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 512;

pub struct SocketTransport {
    port: u16,
    uplink_listener: Option<TcpListener>,
    downlink_listener: Option<TcpListener>,
    uplink: Option<TcpStream>,
    downlink: Option<TcpStream>,
    decoder: LineDecoder,
}

impl SocketTransport {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            uplink_listener: None,
            downlink_listener: None,
            uplink: None,
            downlink: None,
            decoder: LineDecoder::new(),
        }
    }

    /// Bound uplink and downlink addresses, once started.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        let up = self.uplink_listener.as_ref()?.local_addr().ok()?;
        let down = self.downlink_listener.as_ref()?.local_addr().ok()?;
        Some((up, down))
    }

    fn bind(port: u16) -> Result<TcpListener, TransportError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(|e| {
            warn!("SOCK: bind {} failed: {}", port, e);
            TransportError::Bind
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|_| TransportError::Bind)?;
        Ok(listener)
    }

    fn drop_peer(&mut self) {
        let had_uplink = self.uplink.take().is_some();
        let had_downlink = self.downlink.take().is_some();
        if had_uplink || had_downlink {
            info!("SOCK: companion disconnected");
        }
        self.decoder.reset();
    }

    fn accept(&mut self) {
        if self.uplink.is_none() {
            let accepted = self.uplink_listener.as_ref().map(TcpListener::accept);
            if let Some(Ok((stream, peer))) = accepted {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
                let _ = stream.set_nodelay(true);
                info!("SOCK: uplink connected from {}", peer);
                self.uplink = Some(stream);
            }
        }
        if self.downlink.is_none() {
            let accepted = self.downlink_listener.as_ref().map(TcpListener::accept);
            if let Some(Ok((stream, peer))) = accepted {
                if stream.set_nonblocking(true).is_ok() {
                    info!("SOCK: downlink connected from {}", peer);
                    self.decoder.reset();
                    self.downlink = Some(stream);
                }
            }
        }
    }

    /// Whether the uplink peer has gone away.
    fn uplink_closed(&self) -> bool {
        let Some(stream) = self.uplink.as_ref() else {
            return false;
        };
        if stream.set_nonblocking(true).is_err() {
            return true;
        }
        let mut peeked = [0u8; 1];
        let closed = match stream.peek(&mut peeked) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => e.kind() != ErrorKind::WouldBlock,
        };
        let _ = stream.set_nonblocking(false);
        closed
    }

    /// Read the downlink until it would block. Returns `false` on EOF or
    /// error.
    fn read_downlink(&mut self, out: &mut Vec<Frame>) -> bool {
        let Some(stream) = self.downlink.as_mut() else {
            return true;
        };
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => self.decoder.feed(&buf[..n], |line| match split_frame(line) {
                    Some(frame) => out.push(frame),
                    None => debug!("SOCK: line without identifier dropped"),
                }),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("SOCK: downlink read failed: {}", e);
                    return false;
                }
            }
        }
    }

    fn write_uplink(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.uplink.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = stream.write_all(bytes) {
            warn!("SOCK: uplink write failed: {}", e);
            self.drop_peer();
            return Err(TransportError::Io);
        }
        Ok(())
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn register(&mut self, _ids: &ChannelIds) -> Result<(), TransportError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let uplink = Self::bind(self.port)?;
        let downlink_port = if self.port == 0 { 0 } else { self.port.saturating_add(1) };
        let downlink = Self::bind(downlink_port)?;
        self.uplink_listener = Some(uplink);
        self.downlink_listener = Some(downlink);
        if let Some((up, down)) = self.local_addrs() {
            info!("SOCK: listening (uplink {}, downlink {})", up.port(), down.port());
        }
        Ok(())
    }

    fn send(&mut self, id: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.uplink_listener.is_none() {
            return Err(TransportError::NotStarted);
        }
        self.write_uplink(&encode_frame(id, payload))
    }

    fn poll_inbound(&mut self, _now_ms: u64, out: &mut Vec<Frame>) {
        self.accept();
        if self.uplink_closed() || !self.read_downlink(out) {
            self.drop_peer();
        }
    }

    fn is_connected(&self) -> bool {
        self.uplink.is_some()
    }

    fn keepalive(&mut self) -> Result<(), TransportError> {
        if self.uplink.is_none() {
            return Ok(());
        }
        let mut line = KEEPALIVE.as_bytes().to_vec();
        line.push(LINE_TERMINATOR);
        self.write_uplink(&line)
    }

    fn disconnect(&mut self) {
        let streams = [self.uplink.as_ref(), self.downlink.as_ref()];
        for stream in streams.into_iter().flatten() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.drop_peer();
    }
}
