//! GPS serial-to-TCP relay firmware library.
//!
//! Reads NMEA sentences from a GPS receiver on a UART and relays them to a
//! single TCP client, with a small HTTP page for choosing the WiFi role and
//! relay port. Every platform seam (store, radio, serial input) is a trait,
//! so everything except the ESP-IDF backends is tested on the host machine.

pub mod config;
pub mod device;
pub mod host_utils;
pub mod network;
pub mod provisioning;
pub mod relay;
pub mod store;

// Re-export commonly used items
pub use config::{ConfigError, RelayConfig, WifiMode};
pub use device::{Device, DeviceError, DeviceOptions, LoopOutcome};
pub use network::{
    establish, ConnectivityError, ConnectivityState, HostRadio, JoinPolicy, NetworkStatus,
    RadioError, WifiRadio,
};
pub use provisioning::{
    Provisioner, ProvisioningError, ProvisioningServer, RestartReason, RestartRequest,
};
pub use relay::{
    ChannelSource, LineBuffer, RelayError, RelayStats, SerialFeed, SerialRelay, SerialSource,
};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, StoreError};

#[cfg(feature = "esp32")]
pub use network::EspRadio;
#[cfg(feature = "esp32")]
pub use relay::UartSource;
#[cfg(feature = "esp32")]
pub use store::NvsConfigStore;
