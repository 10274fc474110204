//! UART adapter implementing [`SerialPort`].
//!
//! - **`target_os = "espidf"`**: wraps an `esp_idf_hal` `UartDriver`.
//!   Reads never wait (zero-tick timeout).
//! - **all other targets**: an in-memory loopback with RX injection and
//!   TX capture for host tests. Clones share the same buffers.

use crate::app::ports::{PortError, SerialPort};

// ── ESP-IDF ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct UartPort {
    driver: esp_idf_hal::uart::UartDriver<'static>,
}

#[cfg(target_os = "espidf")]
impl UartPort {
    pub fn new(driver: esp_idf_hal::uart::UartDriver<'static>) -> Self {
        Self { driver }
    }
}

#[cfg(target_os = "espidf")]
impl SerialPort for UartPort {
    fn bytes_available(&self) -> usize {
        self.driver.remaining_read().unwrap_or(0)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        self.driver.read(buf, 0).map_err(|e| {
            log::warn!("UART: read failed: {}", e);
            PortError::Io
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.driver.write(rest).map_err(|e| {
                log::warn!("UART: write failed: {}", e);
                PortError::Io
            })?;
            rest = &rest[n..];
        }
        Ok(())
    }
}

// ── Host simulation ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
struct Buffers {
    rx: std::collections::VecDeque<u8>,
    tx: Vec<u8>,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Default)]
pub struct UartPort {
    buffers: std::sync::Arc<std::sync::Mutex<Buffers>>,
}

#[cfg(not(target_os = "espidf"))]
impl UartPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffers> {
        self.buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue bytes as if the companion had sent them.
    pub fn inject_rx(&self, data: &[u8]) {
        self.lock().rx.extend(data);
    }

    /// Drain everything written so far.
    pub fn take_tx(&self) -> Vec<u8> {
        core::mem::take(&mut self.lock().tx)
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialPort for UartPort {
    fn bytes_available(&self) -> usize {
        self.lock().rx.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        let mut buffers = self.lock();
        let n = buf.len().min(buffers.rx.len());
        for (slot, byte) in buf.iter_mut().zip(buffers.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        self.lock().tx.extend_from_slice(data);
        Ok(())
    }
}
