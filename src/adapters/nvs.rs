//! NVS (Non-Volatile Storage) config store.
//!
//! Keeps the [`LinkConfig`] as one postcard blob under `arctic/linkcfg`.
//!
//! - **`target_os = "espidf"`**: `EspNvs` on the default NVS partition.
//! - **`not(target_os = "espidf")`**: an in-memory blob, so boot-time
//!   load/save logic can be tested on the host.

use log::{info, warn};

use crate::app::ports::ConfigStore;
use crate::config::LinkConfig;
use crate::error::ConfigError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "arctic";
const CONFIG_KEY: &str = "linkcfg";

/// Upper bound on the stored blob; a postcard `LinkConfig` is far smaller.
const MAX_BLOB_SIZE: usize = 256;

pub struct NvsConfigStore {
    #[cfg(target_os = "espidf")]
    nvs: EspNvs<NvsDefault>,
    #[cfg(not(target_os = "espidf"))]
    blob: Option<Vec<u8>>,
}

impl NvsConfigStore {
    /// Open the config namespace read-write. The partition handle is
    /// cloneable, so WiFi can share it.
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        let nvs = EspNvs::new(partition, CONFIG_NAMESPACE, true).map_err(|e| {
            warn!("NVS: open '{}' failed: {}", CONFIG_NAMESPACE, e);
            ConfigError::Storage
        })?;
        info!("NVS: config namespace '{}' open", CONFIG_NAMESPACE);
        Ok(Self { nvs })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("NVS: simulation backend");
        Self { blob: None }
    }

    /// Overwrite the raw stored blob.
    #[cfg(not(target_os = "espidf"))]
    pub fn store_raw(&mut self, bytes: &[u8]) {
        self.blob = Some(bytes.to_vec());
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.nvs.get_blob(CONFIG_KEY, &mut buf) {
            Ok(found) => Ok(found.map(<[u8]>::to_vec)),
            Err(e) => {
                warn!("NVS: read '{}' failed: {}", CONFIG_KEY, e);
                Err(ConfigError::Storage)
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.blob.clone())
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        self.nvs.set_blob(CONFIG_KEY, bytes).map_err(|e| {
            warn!("NVS: write '{}' failed: {}", CONFIG_KEY, e);
            ConfigError::Storage
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        self.blob = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NvsConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for NvsConfigStore {
    fn load(&self) -> Result<LinkConfig, ConfigError> {
        match self.read_blob()? {
            Some(bytes) => {
                let config = LinkConfig::from_bytes(&bytes)?;
                info!("NVS: loaded config ({} bytes)", bytes.len());
                Ok(config)
            }
            None => {
                info!("NVS: no stored config, using defaults");
                Ok(LinkConfig::default())
            }
        }
    }

    fn save(&mut self, config: &LinkConfig) -> Result<(), ConfigError> {
        let bytes = config.to_bytes()?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::Storage);
        }
        self.write_blob(&bytes)?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
