//! Host-side serial device discovery.
//!
//! The host relay reads GPS data from a USB serial adapter. When no device is
//! named explicitly the common adapter paths are scanned.

use log::debug;
use std::path::PathBuf;

/// Device patterns tried in order, most specific first.
pub const SERIAL_PORT_PATTERNS: &[&str] = &[
    "/dev/cu.usbserial-*",
    "/dev/cu.wchusbserial*",
    "/dev/cu.SLAB_USBtoUART*",
    "/dev/cu.usbmodem*",
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
];

/// Paths matching the first pattern in `patterns` that matches anything.
pub fn first_matching(patterns: &[&str]) -> Option<PathBuf> {
    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(paths) => {
                if let Some(path) = paths.flatten().next() {
                    return Some(path);
                }
            }
            Err(e) => debug!("Bad serial pattern {}: {}", pattern, e),
        }
    }
    None
}

/// Find a USB serial device to read GPS data from.
pub fn find_serial_port() -> Option<PathBuf> {
    first_matching(SERIAL_PORT_PATTERNS)
}

/// List available serial ports for debugging.
pub fn list_available_ports() -> Vec<String> {
    let mut available_ports = Vec::new();
    for pattern in SERIAL_PORT_PATTERNS {
        if let Ok(paths) = glob::glob(pattern) {
            available_ports.extend(paths.flatten().map(|p| p.to_string_lossy().to_string()));
        }
    }
    available_ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gps_relay_ports_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_first_matching_prefers_earlier_pattern() {
        let dir = scratch_dir("order");
        fs::write(dir.join("ttyACM0"), b"").unwrap();
        fs::write(dir.join("ttyUSB3"), b"").unwrap();

        let usb = format!("{}/ttyUSB*", dir.display());
        let acm = format!("{}/ttyACM*", dir.display());
        let found = first_matching(&[usb.as_str(), acm.as_str()]);
        assert_eq!(found, Some(dir.join("ttyUSB3")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_first_matching_none() {
        let dir = scratch_dir("none");
        let pattern = format!("{}/ttyUSB*", dir.display());
        assert_eq!(first_matching(&[pattern.as_str()]), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_first_matching_skips_bad_pattern() {
        let dir = scratch_dir("bad");
        fs::write(dir.join("ttyUSB0"), b"").unwrap();
        let good = format!("{}/ttyUSB*", dir.display());
        assert_eq!(
            first_matching(&["[", good.as_str()]),
            Some(dir.join("ttyUSB0"))
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_list_available_ports_does_not_panic() {
        // Contents depend on the machine
        let ports = list_available_ports();
        assert!(ports.iter().all(|p| p.starts_with("/dev/")));
    }
}
