//! Host-based GPS relay for development and testing.
//!
//! Runs the same boot sequence and control loop as the firmware, with the
//! configuration in a JSON file, the machine's own network standing in for
//! the WiFi radio, and a serial device (or stdin) as the GPS input.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-relay
//! GPS_RELAY_SERIAL=/dev/ttyUSB0 cargo run --bin host-relay
//! cat track.nmea | GPS_RELAY_SERIAL=- cargo run --bin host-relay
//! ```
//!
//! # Environment
//!
//! - `GPS_RELAY_STORE` - configuration file (default `~/.gps-relay-esp32/config.json`)
//! - `GPS_RELAY_HTTP_PORT` - configuration page port (default 8080)
//! - `GPS_RELAY_SERIAL` - serial device path, or `-` for stdin; a USB serial
//!   adapter is searched for when unset

use gps_relay_esp32::host_utils::{find_serial_port, list_available_ports};
use gps_relay_esp32::store::default_store_path;
use gps_relay_esp32::{ChannelSource, Device, DeviceOptions, FileConfigStore, HostRadio};
use log::{error, info, warn};
use std::fs::File;
use std::path::PathBuf;

/// Configuration page port; port 80 usually needs privileges on the host.
const DEFAULT_HOST_HTTP_PORT: u16 = 8080;

fn store_path() -> PathBuf {
    if let Ok(path) = std::env::var("GPS_RELAY_STORE") {
        return PathBuf::from(path);
    }
    match default_store_path() {
        Ok(path) => path,
        Err(e) => {
            warn!("{}; using ./gps-relay-config.json", e);
            PathBuf::from("gps-relay-config.json")
        }
    }
}

fn http_port() -> u16 {
    match std::env::var("GPS_RELAY_HTTP_PORT") {
        Ok(value) => match value.parse() {
            Ok(port) => port,
            Err(_) => {
                warn!(
                    "Invalid GPS_RELAY_HTTP_PORT '{}', using {}",
                    value, DEFAULT_HOST_HTTP_PORT
                );
                DEFAULT_HOST_HTTP_PORT
            }
        },
        Err(_) => DEFAULT_HOST_HTTP_PORT,
    }
}

/// Open the GPS input. Runs once per process, so the reader thread survives
/// simulated restarts.
fn open_serial_input() -> ChannelSource {
    let requested = std::env::var("GPS_RELAY_SERIAL").ok();

    if requested.as_deref() == Some("-") {
        info!("Reading GPS data from stdin");
        match ChannelSource::spawn_reader("stdin", std::io::stdin()) {
            Ok(source) => return source,
            Err(e) => warn!("Failed to start stdin reader: {}", e),
        }
    } else {
        let path = requested.map(PathBuf::from).or_else(find_serial_port);
        match path {
            Some(path) => {
                info!("Reading GPS data from {}", path.display());
                let label = path.display().to_string();
                match File::open(&path).and_then(|f| ChannelSource::spawn_reader(&label, f)) {
                    Ok(source) => return source,
                    Err(e) => warn!("Failed to open {}: {}", path.display(), e),
                }
            }
            None => {
                warn!("No serial device found");
                let ports = list_available_ports();
                if !ports.is_empty() {
                    info!("Available ports: {}", ports.join(", "));
                }
            }
        }
    }

    // A source whose feed is gone simply stays empty
    warn!("Relaying without GPS input");
    ChannelSource::new().1
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== GPS Host Relay starting ===");

    let mut store = FileConfigStore::new(store_path());
    info!("Configuration file: {}", store.path().display());

    let mut source = open_serial_input();
    let mut radio = HostRadio::new();
    let options = DeviceOptions {
        http_port: http_port(),
        ..DeviceOptions::default()
    };

    // Each iteration is one boot cycle
    loop {
        let device = match Device::boot(&mut store, &mut radio, &mut source, &options) {
            Ok(device) => device,
            Err(e) => {
                error!("Boot failed: {}", e);
                std::process::exit(1);
            }
        };

        info!(
            "Configuration page at http://localhost:{}/",
            device.http_addr().port()
        );

        let request = device.run_until_restart();
        info!("Restarting ({})", request.reason);
    }
}
