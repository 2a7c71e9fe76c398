//! Kernel SPI device used as the panel's byte transport.

use crate::epd4in2b_v2::{EpdError, SoftwareSpi};
use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::io::Write;

/// The SSD1683 controller tops out at 8 MHz.
const MAX_SPEED_HZ: u32 = 8_000_000;

pub struct SpidevHwSpi {
    dev: Spidev,
}

impl SpidevHwSpi {
    pub fn new(path: &str) -> Result<Self, EpdError> {
        let mut dev = Spidev::open(path).map_err(|e| EpdError(format!("{path}: {e}")))?;
        let opts = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(MAX_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&opts)
            .map_err(|e| EpdError(format!("{path}: {e}")))?;
        Ok(Self { dev })
    }
}

impl SoftwareSpi for SpidevHwSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError> {
        self.dev
            .write_all(&[data])
            .map_err(|e| EpdError(e.to_string()))
    }

    fn read_byte(&mut self) -> Result<u8, EpdError> {
        let tx = [0x00u8];
        let mut rx = [0u8];
        let mut transfer = SpidevTransfer::read_write(&tx, &mut rx);
        self.dev
            .transfer(&mut transfer)
            .map_err(|e| EpdError(e.to_string()))?;
        Ok(rx[0])
    }
}
