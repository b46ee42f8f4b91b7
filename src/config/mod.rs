//! Relay configuration data structures.
//!
//! This module contains the platform-independent [`RelayConfig`] that is
//! persisted by the [`crate::store`] backends, along with the fixed constants
//! of the device (default ports, access point identity, hostname).
//!
//! # Example
//!
//! ```
//! use gps_relay_esp32::config::{RelayConfig, WifiMode};
//!
//! let config = RelayConfig::new(WifiMode::StationClient, "MyNetwork", "MyPassword", 5000).unwrap();
//! assert!(config.wants_join());
//!
//! let mode: WifiMode = "AP".parse().unwrap();
//! assert_eq!(mode, WifiMode::AccessPoint);
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default TCP port for the GPS relay.
pub const DEFAULT_TCP_PORT: u16 = 5000;

/// Port of the provisioning web page on the device.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// SSID advertised when the device hosts its own network.
pub const ACCESS_POINT_SSID: &str = "ESP-GPS";

/// Hostname label advertised for discovery (`esp32.local`).
pub const HOSTNAME: &str = "esp32";

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Network role selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WifiMode {
    /// Host a standalone network.
    #[default]
    AccessPoint,
    /// Join an existing network as a client.
    StationClient,
}

impl WifiMode {
    /// Short label used in the form, the status page and persistent storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessPoint => "AP",
            Self::StationClient => "STA",
        }
    }
}

impl std::str::FromStr for WifiMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AP" => Ok(Self::AccessPoint),
            "STA" => Ok(Self::StationClient),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for WifiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the device persists: network role, credentials and relay port.
///
/// The password is zeroed when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RelayConfig {
    /// Network role.
    #[zeroize(skip)]
    pub mode: WifiMode,
    /// Name of the network to join (unused when hosting).
    pub ssid: String,
    /// Password of the network to join; empty for open networks.
    pub password: String,
    /// TCP port the relay listens on.
    #[zeroize(skip)]
    pub port: u16,
}

impl RelayConfig {
    /// Create a validated configuration.
    pub fn new(
        mode: WifiMode,
        ssid: impl Into<String>,
        password: impl Into<String>,
        port: u16,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            mode,
            ssid: ssid.into(),
            password: password.into(),
            port,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// An empty SSID is accepted in either mode: in station mode it makes the
    /// device host its own network at boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty is OK for open networks
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port.to_string()));
        }

        Ok(())
    }

    /// True when boot should attempt to join a network.
    pub fn wants_join(&self) -> bool {
        self.mode == WifiMode::StationClient && !self.ssid.is_empty()
    }

    /// Check if the network to join is open (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: WifiMode::AccessPoint,
            ssid: String::new(),
            password: String::new(),
            port: DEFAULT_TCP_PORT,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("mode", &self.mode)
            .field("ssid", &self.ssid)
            .field("password", &if self.is_open() { "" } else { "****" })
            .field("port", &self.port)
            .finish()
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Port is not a number in 1..=65535.
    InvalidPort(String),
    /// Port is taken by the provisioning page.
    PortReserved(u16),
    /// Mode is neither `AP` nor `STA`.
    UnknownMode(String),
    /// A required form field was not submitted.
    MissingField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidPort(port) => write!(f, "invalid TCP port: '{}'", port),
            Self::PortReserved(port) => {
                write!(f, "TCP port {} is used by the configuration page", port)
            }
            Self::UnknownMode(mode) => write!(f, "unknown mode: '{}'", mode),
            Self::MissingField(name) => write!(f, "missing field: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // ==================== RelayConfig Tests ====================

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.mode, WifiMode::AccessPoint);
        assert!(config.ssid.is_empty());
        assert!(config.password.is_empty());
        assert_eq!(config.port, DEFAULT_TCP_PORT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_station_config() {
        let config =
            RelayConfig::new(WifiMode::StationClient, "TestNetwork", "password123", 6000).unwrap();
        assert_eq!(config.ssid, "TestNetwork");
        assert_eq!(config.port, 6000);
        assert!(config.wants_join());
    }

    #[test]
    fn test_station_with_empty_ssid_does_not_join() {
        let config = RelayConfig::new(WifiMode::StationClient, "", "", 5000).unwrap();
        assert!(!config.wants_join());
    }

    #[test]
    fn test_access_point_never_joins() {
        let config = RelayConfig::new(WifiMode::AccessPoint, "Home", "password123", 5000).unwrap();
        assert!(!config.wants_join());
    }

    #[test]
    fn test_ssid_too_long() {
        let result = RelayConfig::new(WifiMode::StationClient, "a".repeat(33), "", 5000);
        assert!(matches!(result, Err(ConfigError::SsidTooLong { .. })));
    }

    #[test]
    fn test_password_bounds() {
        let short = RelayConfig::new(WifiMode::StationClient, "Net", "short", 5000);
        assert!(matches!(short, Err(ConfigError::PasswordTooShort { .. })));

        let long = RelayConfig::new(WifiMode::StationClient, "Net", "a".repeat(65), 5000);
        assert!(matches!(long, Err(ConfigError::PasswordTooLong { .. })));

        assert!(RelayConfig::new(WifiMode::StationClient, "Net", "12345678", 5000).is_ok());
        assert!(RelayConfig::new(WifiMode::StationClient, "Net", "a".repeat(64), 5000).is_ok());
    }

    #[test]
    fn test_port_zero_rejected() {
        let result = RelayConfig::new(WifiMode::AccessPoint, "", "", 0);
        assert_eq!(result, Err(ConfigError::InvalidPort("0".into())));
    }

    #[test]
    fn test_debug_hides_password() {
        let config =
            RelayConfig::new(WifiMode::StationClient, "Net", "supersecret", 5000).unwrap();
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("Net"));
        assert!(!debug_str.contains("supersecret"));
    }

    // ==================== WifiMode Tests ====================

    #[test]
    fn test_mode_parse() {
        assert_eq!(WifiMode::from_str("AP").unwrap(), WifiMode::AccessPoint);
        assert_eq!(WifiMode::from_str("STA").unwrap(), WifiMode::StationClient);
        assert_eq!(WifiMode::from_str(" sta ").unwrap(), WifiMode::StationClient);
    }

    #[test]
    fn test_mode_unknown() {
        let result = WifiMode::from_str("mesh");
        assert!(matches!(result, Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn test_mode_as_str() {
        assert_eq!(WifiMode::AccessPoint.as_str(), "AP");
        assert_eq!(WifiMode::StationClient.as_str(), "STA");
        assert_eq!(WifiMode::StationClient.to_string(), "STA");
    }
}
