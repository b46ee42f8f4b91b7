//! Provisioning endpoint.
//!
//! A small HTTP page for choosing the network role, credentials and relay
//! port. Saving or resetting writes the [`ConfigStore`] and asks for a
//! restart; the new configuration takes effect on the next boot.
//!
//! | Method | Path      | Action                                   |
//! |--------|-----------|------------------------------------------|
//! | GET    | `/`       | Form pre-filled with the stored values   |
//! | POST   | `/save`   | Validate, store, restart                 |
//! | POST   | `/reset`  | Erase the store, restart                 |
//! | GET    | `/status` | Mode, state, address and relay counters  |

mod pages;
mod server;

pub use pages::{config_from_form, parse_form, percent_decode, render_form, render_status};
pub use server::{ProvisioningError, ProvisioningServer};

use crate::config::RelayConfig;
use crate::network::NetworkStatus;
use crate::store::{ConfigStore, StoreError};
use log::{info, warn};
use std::fmt;
use std::time::Duration;

/// Delay between acknowledging a save or reset and restarting, so the
/// response reaches the browser.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Why a restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A new configuration was stored.
    ConfigSaved,
    /// The store was erased.
    FactoryReset,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigSaved => write!(f, "configuration saved"),
            Self::FactoryReset => write!(f, "factory reset"),
        }
    }
}

/// A request to end the boot cycle and start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub reason: RestartReason,
    /// Time to keep serving before restarting.
    pub delay: Duration,
}

/// Store access and status for the provisioning handlers.
pub struct Provisioner<'a, St: ConfigStore> {
    store: &'a mut St,
    status: NetworkStatus,
    relay_port: u16,
    restart_delay: Duration,
}

impl<'a, St: ConfigStore> Provisioner<'a, St> {
    /// Create a provisioner for this boot cycle.
    ///
    /// `status` and `relay_port` describe what the device is actually doing,
    /// which may differ from the stored configuration after a save.
    pub fn new(store: &'a mut St, status: NetworkStatus, relay_port: u16) -> Self {
        Self {
            store,
            status,
            relay_port,
            restart_delay: RESTART_DELAY,
        }
    }

    /// Override the delay carried by restart requests.
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// The stored configuration.
    pub fn current_config(&self) -> RelayConfig {
        self.store.load()
    }

    /// Connectivity of this boot cycle.
    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    /// Port the relay is listening on.
    pub fn relay_port(&self) -> u16 {
        self.relay_port
    }

    /// Store `config` and request a restart.
    ///
    /// On failure nothing is requested and the device keeps running with the
    /// configuration it booted with.
    pub fn apply_and_restart(&mut self, config: &RelayConfig) -> Result<RestartRequest, StoreError> {
        if let Err(e) = self.store.save(config) {
            warn!("Saving configuration failed: {}", e);
            return Err(e);
        }
        info!("Configuration saved: {:?}", config);
        Ok(self.restart(RestartReason::ConfigSaved))
    }

    /// Erase the store and request a restart.
    pub fn factory_reset_and_restart(&mut self) -> Result<RestartRequest, StoreError> {
        if let Err(e) = self.store.reset() {
            warn!("Factory reset failed: {}", e);
            return Err(e);
        }
        info!("Configuration erased");
        Ok(self.restart(RestartReason::FactoryReset))
    }

    fn restart(&self, reason: RestartReason) -> RestartRequest {
        info!("Restart scheduled in {:?} ({})", self.restart_delay, reason);
        RestartRequest {
            reason,
            delay: self.restart_delay,
        }
    }
}
