//! Host radio.
//!
//! On host systems the OS handles networking. This radio is a thin stand-in
//! that reports the machine's own address for both roles, so the complete
//! boot sequence runs off-device.

use super::{RadioError, WifiRadio};
use log::info;
use std::net::{IpAddr, Ipv4Addr};

/// Host stand-in for the WiFi radio.
///
/// Joining "succeeds" as soon as a local address can be detected; hosting
/// reports the same address, or loopback when none is found.
pub struct HostRadio {
    ip_addr: Option<IpAddr>,
    joined_ssid: Option<String>,
}

impl HostRadio {
    /// Create a new host radio.
    pub fn new() -> Self {
        Self {
            ip_addr: None,
            joined_ssid: None,
        }
    }

    /// Name of the network passed to the last join request.
    pub fn joined_ssid(&self) -> Option<&str> {
        self.joined_ssid.as_deref()
    }

    /// Get the primary local IP address.
    ///
    /// This uses a trick: create a UDP socket and "connect" to a public IP
    /// (doesn't actually send anything), then check which local address was chosen.
    fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

impl Default for HostRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiRadio for HostRadio {
    fn begin_join(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        // The OS is already connected; just note which network was asked for
        self.joined_ssid = Some(ssid.to_string());
        self.ip_addr = Self::detect_local_ip();
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.joined_ssid.is_some() && self.ip_addr.is_some()
    }

    fn station_addr(&self) -> Option<IpAddr> {
        self.ip_addr
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<IpAddr, RadioError> {
        let ip = Self::detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        info!("Host network stands in for access point '{}'", ssid);
        self.ip_addr = Some(ip);
        Ok(ip)
    }
}
