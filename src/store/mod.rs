//! Persistent configuration store.
//!
//! The device keeps its [`RelayConfig`] in a small key/value namespace that
//! survives restarts:
//!
//! | key    | type    | default   |
//! |--------|---------|-----------|
//! | `mode` | string  | `"AP"`    |
//! | `ssid` | string  | `""`      |
//! | `pass` | string  | `""`      |
//! | `port` | integer | `5000`    |
//!
//! A missing or unusable key always means "use the default", so loading never
//! fails. Backends:
//!
//! - [`MemoryConfigStore`] - in-memory, with write-failure injection for tests
//! - [`FileConfigStore`] - JSON document on the host filesystem
//! - `NvsConfigStore` - ESP-IDF Non-Volatile Storage (ESP32 only)

mod file;
#[cfg(feature = "esp32")]
mod nvs;

pub use file::{default_store_path, FileConfigStore};
#[cfg(feature = "esp32")]
pub use nvs::NvsConfigStore;

use crate::config::{RelayConfig, WifiMode, DEFAULT_TCP_PORT};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace holding the configuration keys.
pub const STORE_NAMESPACE: &str = "config";

/// Key for the network mode (`"AP"` or `"STA"`).
pub const KEY_MODE: &str = "mode";

/// Key for the network name.
pub const KEY_SSID: &str = "ssid";

/// Key for the network password.
pub const KEY_PASS: &str = "pass";

/// Key for the relay TCP port.
pub const KEY_PORT: &str = "port";

/// Durable storage for the relay configuration.
///
/// Only the provisioning endpoint writes, and every write is followed by a
/// restart, so implementations need not handle concurrent writers.
pub trait ConfigStore {
    /// Load the stored configuration, substituting defaults for missing keys.
    fn load(&self) -> RelayConfig;

    /// Replace every stored key with the values from `config`.
    fn save(&mut self, config: &RelayConfig) -> Result<(), StoreError>;

    /// Erase every stored key. The next [`load`](Self::load) returns defaults.
    fn reset(&mut self) -> Result<(), StoreError>;
}

/// Raw key/value contents of the store, each key optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl StoredFields {
    /// Capture every field of a configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            mode: Some(config.mode.as_str().to_string()),
            ssid: Some(config.ssid.clone()),
            pass: Some(config.password.clone()),
            port: Some(i32::from(config.port)),
        }
    }

    /// Build a configuration, falling back to the default for each missing
    /// or unusable key.
    pub fn to_config(&self) -> RelayConfig {
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring stored mode '{}', using AP", raw);
                WifiMode::AccessPoint
            }),
            None => WifiMode::AccessPoint,
        };

        let port = match self.port {
            Some(raw) => u16::try_from(raw)
                .ok()
                .filter(|port| *port != 0)
                .unwrap_or_else(|| {
                    log::warn!("Ignoring stored port {}, using {}", raw, DEFAULT_TCP_PORT);
                    DEFAULT_TCP_PORT
                }),
            None => DEFAULT_TCP_PORT,
        };

        RelayConfig {
            mode,
            ssid: self.ssid.clone().unwrap_or_default(),
            password: self.pass.clone().unwrap_or_default(),
            port,
        }
    }
}

/// Errors reported by a [`ConfigStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The persistent medium is unavailable, full, or did not keep the write.
    WriteFailure(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailure(reason) => write!(f, "config write failed: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::WriteFailure(e.to_string())
    }
}

/// In-memory store.
///
/// Survives a simulated restart as long as the value itself is kept, which is
/// what the host binary and the tests rely on.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    fields: StoredFields,
    unavailable: bool,
}

impl MemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with raw fields.
    pub fn with_fields(fields: StoredFields) -> Self {
        Self {
            fields,
            unavailable: false,
        }
    }

    /// Make every subsequent write fail, as if the medium were full.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Raw stored fields.
    pub fn fields(&self) -> &StoredFields {
        &self.fields
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::WriteFailure("storage unavailable".into()));
        }
        Ok(())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> RelayConfig {
        self.fields.to_config()
    }

    fn save(&mut self, config: &RelayConfig) -> Result<(), StoreError> {
        self.check_available()?;
        self.fields = StoredFields::from_config(config);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.check_available()?;
        self.fields = StoredFields::default();
        Ok(())
    }
}
