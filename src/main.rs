//! GPS relay firmware binary.
//!
//! ```bash
//! cargo espflash flash --bin gps-relay --features esp32 --release
//! ```
//!
//! GPS receiver on UART1 (RX GPIO16, TX GPIO17). Relay clients connect to
//! the configured TCP port (default 5000); the configuration page is on
//! port 80.

#[cfg(feature = "esp32")]
fn main() {
    use log::{error, info};
    use std::time::Duration;

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== GPS relay starting ===");

    match run() {
        Ok(()) => info!("Rebooting"),
        Err(e) => {
            error!("Boot failed: {}", e);
            // Avoid a tight reboot loop on a persistent fault
            std::thread::sleep(Duration::from_secs(5));
        }
    }

    esp_idf_hal::reset::restart();
}

/// Boot once and serve until a restart is requested.
#[cfg(feature = "esp32")]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use gps_relay_esp32::{Device, DeviceOptions, EspRadio, NvsConfigStore, UartSource};

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;

    let mut store = NvsConfigStore::new(partition.clone())?;
    let mut radio = EspRadio::new(peripherals.modem, sysloop, Some(partition))?;
    let mut source = UartSource::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
    )?;

    let device = Device::boot(
        &mut store,
        &mut radio,
        &mut source,
        &DeviceOptions::default(),
    )?;
    let request = device.run_until_restart();
    log::info!("Boot cycle ended: {}", request.reason);
    Ok(())
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-relay' to run the relay on this machine.");
}
