//! Configuration persistence for host (development) builds.
//!
//! Stores the configuration keys as a JSON document so they persist across
//! runs. Uses `~/.gps-relay-esp32/config.json` by default.

use super::{ConfigStore, StoreError, StoredFields};
use crate::config::RelayConfig;
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default store file path.
///
/// Returns `~/.gps-relay-esp32/config.json`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".gps-relay-esp32")
        .join("config.json"))
}

/// JSON file backed [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store backed by the file at `path`. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw fields.
    ///
    /// Returns empty fields if the file is missing or corrupted.
    fn read_fields(&self) -> StoredFields {
        let json = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config file found at {:?}", self.path);
                return StoredFields::default();
            }
            Err(e) => {
                log::warn!("Failed to read config file: {}", e);
                return StoredFields::default();
            }
        };

        match serde_json::from_str(&json) {
            Ok(fields) => fields,
            Err(e) => {
                log::error!("Failed to parse stored config: {}", e);
                StoredFields::default()
            }
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> RelayConfig {
        self.read_fields().to_config()
    }

    fn save(&mut self, config: &RelayConfig) -> Result<(), StoreError> {
        // Create parent directory if needed
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let fields = StoredFields::from_config(config);
        let json = serde_json::to_string_pretty(&fields)
            .map_err(|e| StoreError::WriteFailure(e.to_string()))?;

        // Write beside the target and rename so a crash never leaves half a file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, &self.path)?;

        // Verify write by reading back
        let read_back = self.read_fields();
        if read_back != fields {
            return Err(StoreError::WriteFailure(format!(
                "verification failed for {:?}",
                self.path
            )));
        }

        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        log::warn!("Config cleared from {:?} - defaults apply on next boot", self.path);
        Ok(())
    }
}
