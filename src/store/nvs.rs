//! NVS persistence for the relay configuration.
//!
//! Each field lives under its own key in the `config` namespace of ESP32's
//! Non-Volatile Storage, so a missing key simply falls back to its default.

use super::{
    ConfigStore, StoreError, StoredFields, KEY_MODE, KEY_PASS, KEY_PORT, KEY_SSID,
    STORE_NAMESPACE,
};
use crate::config::{RelayConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::info;

/// Read buffer for string keys: longest value plus NUL terminator.
const MAX_STR_BUFFER_SIZE: usize = MAX_PASSWORD_LEN + 1;

impl From<EspError> for StoreError {
    fn from(e: EspError) -> Self {
        Self::WriteFailure(format!("NVS error: {:?}", e))
    }
}

/// NVS backed [`ConfigStore`].
pub struct NvsConfigStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsConfigStore {
    /// Open the configuration namespace on the default NVS partition.
    ///
    /// The partition handle is cloned from the one shared with the WiFi
    /// driver; `EspDefaultNvsPartition::take()` may only be called once.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, STORE_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    fn read_str(&self, key: &str) -> Option<String> {
        let mut buf = [0u8; MAX_STR_BUFFER_SIZE];
        match self.nvs.get_str(key, &mut buf) {
            Ok(value) => value.map(str::to_string),
            Err(e) => {
                log::warn!("Failed to read '{}' from NVS: {:?}", key, e);
                None
            }
        }
    }

    fn read_fields(&self) -> StoredFields {
        let port = match self.nvs.get_i32(KEY_PORT) {
            Ok(port) => port,
            Err(e) => {
                log::warn!("Failed to read '{}' from NVS: {:?}", KEY_PORT, e);
                None
            }
        };

        StoredFields {
            mode: self.read_str(KEY_MODE),
            ssid: self.read_str(KEY_SSID),
            pass: self.read_str(KEY_PASS),
            port,
        }
    }
}

impl ConfigStore for NvsConfigStore {
    fn load(&self) -> RelayConfig {
        let fields = self.read_fields();
        if fields == StoredFields::default() {
            log::debug!("No config found in NVS");
        }
        fields.to_config()
    }

    /// Write every key, then read back to catch flash write failures that
    /// do not return an error code.
    fn save(&mut self, config: &RelayConfig) -> Result<(), StoreError> {
        debug_assert!(config.ssid.len() <= MAX_SSID_LEN);

        let fields = StoredFields::from_config(config);
        self.nvs.set_str(KEY_MODE, config.mode.as_str())?;
        self.nvs.set_str(KEY_SSID, &config.ssid)?;
        self.nvs.set_str(KEY_PASS, &config.password)?;
        self.nvs.set_i32(KEY_PORT, i32::from(config.port))?;

        if self.read_fields() != fields {
            log::error!("Config verification failed - data mismatch after save");
            return Err(StoreError::WriteFailure("NVS read-back mismatch".into()));
        }

        info!("Config saved and verified in NVS");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        for key in [KEY_MODE, KEY_SSID, KEY_PASS, KEY_PORT] {
            self.nvs.remove(key)?;
        }
        log::warn!("Config cleared from NVS - defaults apply on next boot");
        Ok(())
    }
}
