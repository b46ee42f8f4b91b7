//! GPS receiver UART (ESP32 only).

use super::SerialSource;
use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config, Uart, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_sys::EspError;
use log::info;

/// GPS receiver baud rate (8-N-1).
pub const GPS_BAUD_RATE: u32 = 115_200;

/// UART connected to the GPS receiver.
pub struct UartSource {
    uart: UartDriver<'static>,
}

impl UartSource {
    /// Open the UART at [`GPS_BAUD_RATE`], 8-N-1, without flow control.
    pub fn new(
        uart: impl Peripheral<P = impl Uart> + 'static,
        tx: impl Peripheral<P = impl OutputPin> + 'static,
        rx: impl Peripheral<P = impl InputPin> + 'static,
    ) -> Result<Self, EspError> {
        let config = Config::default().baudrate(Hertz(GPS_BAUD_RATE));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        info!("GPS UART ready at {} baud", GPS_BAUD_RATE);
        Ok(Self { uart })
    }
}

impl SerialSource for UartSource {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        // NON_BLOCK returns at once with whatever the driver's FIFO holds
        match self.uart.read(buf, NON_BLOCK) {
            Ok(n) => n,
            Err(e) => {
                log::debug!("UART read failed: {:?}", e);
                0
            }
        }
    }
}
