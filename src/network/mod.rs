//! Network connectivity state machine.
//!
//! At boot the device decides, from its stored [`RelayConfig`], whether to
//! join an existing network or host its own:
//!
//! ```text
//!           AP mode or empty SSID
//!   Start ─────────────────────────► Hosting
//!     │
//!     │ STA mode with SSID
//!     ▼
//!   Joining ──── associated ───────► Joined
//!     │
//!     └──────── timeout ───────────► FallenBack (hosts like Hosting)
//! ```
//!
//! Every end state is final for the boot cycle. There is no reconnect when a
//! joined network disappears; only a restart re-runs [`establish`].
//!
//! The radio itself sits behind the [`WifiRadio`] trait so the same state
//! machine drives the ESP-IDF driver (`esp32` feature) and the host stand-in.

use crate::config::{RelayConfig, WifiMode, ACCESS_POINT_SSID};
use log::{info, warn};
use std::fmt;
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, Instant};

mod host;
#[cfg(feature = "esp32")]
mod wifi;

pub use host::HostRadio;
#[cfg(feature = "esp32")]
pub use wifi::EspRadio;

/// How often association status is polled while joining.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a join may take before falling back to hosting.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform radio primitives used by the state machine.
pub trait WifiRadio {
    /// Start associating with a network. Must not wait for the result;
    /// retries before the timeout are the driver's business.
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// True once associated and holding a routable address.
    fn is_joined(&mut self) -> bool;

    /// Address obtained on the joined network.
    fn station_addr(&self) -> Option<IpAddr>;

    /// Bring up an open standalone network named `ssid`, returning the
    /// device's address on it.
    fn start_access_point(&mut self, ssid: &str) -> Result<IpAddr, RadioError>;

    /// Keep the radio awake for continuous reception.
    fn disable_power_save(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}

/// Connectivity state for the current boot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Hosting a standalone network by choice.
    Hosting,
    /// Attempting to join the configured network.
    Joining,
    /// Joined the configured network.
    Joined,
    /// Hosting a standalone network because the join timed out.
    FallenBack,
}

impl ConnectivityState {
    /// First state after reading the configuration.
    pub fn initial(config: &RelayConfig) -> Self {
        if config.wants_join() {
            Self::Joining
        } else {
            Self::Hosting
        }
    }

    /// True when the device serves its own network.
    pub fn is_hosting(&self) -> bool {
        matches!(self, Self::Hosting | Self::FallenBack)
    }

    /// Human-readable state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosting => "hosting",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::FallenBack => "fallen back",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timing of the join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPolicy {
    /// Delay between association checks.
    pub poll_interval: Duration,
    /// Total time allowed before falling back.
    pub timeout: Duration,
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            poll_interval: JOIN_POLL_INTERVAL,
            timeout: JOIN_TIMEOUT,
        }
    }
}

/// Snapshot of connectivity for the status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    /// Final state of this boot cycle.
    pub state: ConnectivityState,
    /// Mode the user configured.
    pub mode: WifiMode,
    /// Device address, if the radio reported one.
    pub address: Option<IpAddr>,
}

impl NetworkStatus {
    /// Label of the configured mode (`AP` or `STA`).
    pub fn mode_label(&self) -> &'static str {
        self.mode.as_str()
    }
}

/// Run the state machine to completion.
///
/// Blocks for at most [`JoinPolicy::timeout`] plus one poll interval. Never
/// fails: a join timeout becomes [`ConnectivityState::FallenBack`] and a
/// radio failure is logged and leaves the device without an address.
pub fn establish<R: WifiRadio>(
    config: &RelayConfig,
    radio: &mut R,
    policy: &JoinPolicy,
) -> NetworkStatus {
    let mut state = ConnectivityState::initial(config);
    info!("Network mode {}: {}", config.mode, state);

    let mut address = None;

    if state == ConnectivityState::Joining {
        match join_network(config, radio, policy) {
            Ok(addr) => {
                info!("Connected to '{}', IP: {}", config.ssid, addr);
                state = ConnectivityState::Joined;
                address = Some(addr);
            }
            Err(e) => {
                warn!("{} - falling back to access point mode", e);
                state = ConnectivityState::FallenBack;
            }
        }
    }

    if state.is_hosting() {
        match host_network(radio) {
            Ok(addr) => address = Some(addr),
            Err(e) => warn!("{}", e),
        }
    }

    if let Err(e) = radio.disable_power_save() {
        warn!("Failed to disable WiFi power save: {}", e);
    }

    info!("Network ready: {}", state);
    NetworkStatus {
        state,
        mode: config.mode,
        address,
    }
}

/// Join the configured network, polling until associated or timed out.
fn join_network<R: WifiRadio>(
    config: &RelayConfig,
    radio: &mut R,
    policy: &JoinPolicy,
) -> Result<IpAddr, ConnectivityError> {
    info!("Connecting to WiFi: {}", config.ssid);

    // A failed start is not final: polling then runs into the timeout
    if let Err(e) = radio.begin_join(&config.ssid, &config.password) {
        warn!("Join request for '{}' failed: {}", config.ssid, e);
    }

    let started = Instant::now();
    loop {
        if radio.is_joined() {
            if let Some(addr) = radio.station_addr() {
                return Ok(addr);
            }
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(ConnectivityError::JoinTimeout { waited });
        }

        log::debug!("Waiting for '{}' ({:?} elapsed)", config.ssid, waited);
        thread::sleep(policy.poll_interval.min(policy.timeout - waited));
    }
}

fn host_network<R: WifiRadio>(radio: &mut R) -> Result<IpAddr, ConnectivityError> {
    let addr = radio.start_access_point(ACCESS_POINT_SSID)?;
    info!("AP mode '{}', IP: {}", ACCESS_POINT_SSID, addr);
    Ok(addr)
}

/// Connectivity failures. None of them is fatal.
#[derive(Debug)]
pub enum ConnectivityError {
    /// The network was not joined within the timeout.
    JoinTimeout { waited: Duration },
    /// The radio refused an operation.
    Radio(RadioError),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JoinTimeout { waited } => {
                write!(f, "join timed out after {} ms", waited.as_millis())
            }
            Self::Radio(e) => write!(f, "radio error: {}", e),
        }
    }
}

impl std::error::Error for ConnectivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Radio(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RadioError> for ConnectivityError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

/// Errors reported by a [`WifiRadio`].
#[derive(Debug)]
pub enum RadioError {
    /// SSID is invalid (too long or contains invalid characters).
    InvalidSsid,
    /// Password is invalid.
    InvalidPassword,
    /// Driver failure.
    Driver(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::Driver(msg) => write!(f, "driver error: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for RadioError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Driver(format!("ESP error: {:?}", e))
    }
}
