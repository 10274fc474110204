//! OTA partition writer.
//!
//! - **`target_os = "espidf"`**: wraps the `esp-ota` crate. `begin` opens
//!   the inactive app partition, `end` validates the image and switches
//!   the boot partition.
//! - **`not(target_os = "espidf")`**: keeps the image in memory so the
//!   OTA state machine can be exercised on the host.
//!
//! Both variants enforce the same size and magic-byte rules, so a host
//! test that passes here fails the same way on the device.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{FirmwareError, FirmwareTarget};

/// First byte of every ESP application image.
pub const IMAGE_MAGIC: u8 = 0xE9;

pub struct FlashTarget {
    capacity: u32,
    expected: u32,
    written: u32,
    active: bool,
    last_error: Option<FirmwareError>,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
}

// SAFETY: `OtaUpdate` holds a pointer into the static partition table and
// an IDF handle; both are only touched through `&mut self`.
#[cfg(target_os = "espidf")]
unsafe impl Send for FlashTarget {}

impl FlashTarget {
    /// A writer that accepts images up to `capacity` bytes.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            expected: 0,
            written: 0,
            active: false,
            last_error: None,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(not(target_os = "espidf"))]
            image: Vec::new(),
        }
    }

    /// Size the writer from the next OTA partition in the partition table.
    #[cfg(target_os = "espidf")]
    pub fn from_partition() -> Option<Self> {
        let part = unsafe {
            esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null())
        };
        if part.is_null() {
            warn!("OTA: no update partition in the partition table");
            return None;
        }
        let size = unsafe { (*part).size };
        info!("OTA: update partition holds {} bytes", size);
        Some(Self::new(size))
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    /// The bytes received so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    fn reject(&mut self, error: FirmwareError) -> usize {
        self.last_error = Some(error);
        0
    }

    #[cfg(target_os = "espidf")]
    fn open(&mut self) -> Result<(), FirmwareError> {
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            FirmwareError::Begin
        })?;
        self.update = Some(update);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn open(&mut self) -> Result<(), FirmwareError> {
        self.image.clear();
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn store(&mut self, chunk: &[u8]) -> Result<(), FirmwareError> {
        let update = self.update.as_mut().ok_or(FirmwareError::NotStarted)?;
        update.write(chunk).map_err(|e| {
            warn!("esp-ota write failed: {:?}", e);
            FirmwareError::Write
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn store(&mut self, chunk: &[u8]) -> Result<(), FirmwareError> {
        self.image.extend_from_slice(chunk);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn commit(&mut self) -> Result<(), FirmwareError> {
        let update = self.update.take().ok_or(FirmwareError::NotStarted)?;
        let mut completed = update.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            FirmwareError::End
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            FirmwareError::End
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn commit(&mut self) -> Result<(), FirmwareError> {
        Ok(())
    }
}

impl FirmwareTarget for FlashTarget {
    fn begin(&mut self, size: u32) -> Result<(), FirmwareError> {
        self.abort();
        if size == 0 {
            return Err(FirmwareError::BadSize);
        }
        if size > self.capacity {
            return Err(FirmwareError::NoSpace);
        }
        self.open()?;
        self.expected = size;
        self.active = true;
        info!("OTA: partition open for {} bytes", size);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        if !self.active {
            return self.reject(FirmwareError::NotStarted);
        }
        if self.written as usize + chunk.len() > self.expected as usize {
            return self.reject(FirmwareError::BadSize);
        }
        if self.written == 0 && chunk.first().is_some_and(|&b| b != IMAGE_MAGIC) {
            return self.reject(FirmwareError::MagicByte);
        }
        if let Err(e) = self.store(chunk) {
            return self.reject(e);
        }
        self.written += chunk.len() as u32;
        chunk.len()
    }

    fn is_finished(&self) -> bool {
        self.active && self.written == self.expected
    }

    fn end(&mut self) -> Result<(), FirmwareError> {
        if !self.active {
            return Err(FirmwareError::NotStarted);
        }
        if self.written != self.expected {
            self.last_error = Some(FirmwareError::BadSize);
            return Err(FirmwareError::BadSize);
        }
        let result = self.commit();
        self.active = false;
        if let Err(e) = result {
            self.last_error = Some(e);
        }
        result
    }

    fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // dropping the handle aborts the partition write
            self.update.take();
        }
        self.expected = 0;
        self.written = 0;
        self.active = false;
        self.last_error = None;
    }

    fn last_error(&self) -> Option<FirmwareError> {
        self.last_error
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

/// Reboot into the newly written image.
#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    info!("OTA: rebooting into new firmware");
    esp_ota::restart();
}
