//! E-ink arrival board
//!
//! Glues the [`Epd4in2bV2`] driver to the [`Display`] trait: every call draws into
//! a [`DisplayBuffer`] with the board layout from [`crate::renderer`] and pushes the
//! frame to the panel.
//!
//! The panel is left in deep sleep after each frame (the image persists without
//! power) and woken with a fresh init before the next one. That keeps the
//! controller out of its powered state between the long refresh intervals.

use crate::display::{Display, DisplayError};
use crate::epd4in2b_v2::{
    Color, DisplayBuffer, Epd4in2bV2, EpdError, GpioPin, InputPin, Rotation, SoftwareSpi,
    EPD_HEIGHT, EPD_WIDTH,
};
use crate::renderer::{draw_board, draw_message};
use crate::ArrivalSnapshot;
use tracing::debug;

impl From<EpdError> for DisplayError {
    fn from(err: EpdError) -> Self {
        DisplayError::Hardware(err.0)
    }
}

pub struct EinkDisplay<SPI, CS, DC, RST, BUSY> {
    epd: Epd4in2bV2<SPI, CS, DC, RST, BUSY>,
    buffer: DisplayBuffer,
    asleep: bool,
}

impl<SPI, CS, DC, RST, BUSY> EinkDisplay<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    /// Initialize the panel. Fails if the controller does not come up.
    pub fn new(
        mut epd: Epd4in2bV2<SPI, CS, DC, RST, BUSY>,
        rotation: Rotation,
    ) -> Result<Self, DisplayError> {
        epd.init()?;
        Ok(Self {
            epd,
            buffer: DisplayBuffer::with_rotation(EPD_WIDTH, EPD_HEIGHT, rotation),
            asleep: false,
        })
    }

    fn wake(&mut self) -> Result<(), DisplayError> {
        if self.asleep {
            debug!("waking panel");
            self.epd.init()?;
            self.asleep = false;
        }
        Ok(())
    }

    fn push_frame(&mut self) -> Result<(), DisplayError> {
        self.wake()?;
        self.epd
            .display(self.buffer.black_buffer(), self.buffer.red_buffer())?;
        self.epd.sleep()?;
        self.asleep = true;
        Ok(())
    }
}

impl<SPI, CS, DC, RST, BUSY> Display for EinkDisplay<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi + Send,
    CS: GpioPin + Send,
    DC: GpioPin + Send,
    RST: GpioPin + Send,
    BUSY: InputPin + Send,
{
    fn render(&mut self, snapshot: &ArrivalSnapshot, index: usize) -> Result<(), DisplayError> {
        self.buffer.clear(Color::White);
        if let Err(never) = draw_board(snapshot, index, &mut self.buffer) {
            match never {}
        }
        debug!(
            records = snapshot.len(),
            index,
            black_pixels = self.buffer.black_pixel_count(),
            "rendering arrival board"
        );
        self.push_frame()
    }

    fn render_message(&mut self, text: &str) -> Result<(), DisplayError> {
        self.buffer.clear(Color::White);
        if let Err(never) = draw_message(text, &mut self.buffer) {
            match never {}
        }
        self.push_frame()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.wake()?;
        self.epd.clear()?;
        self.buffer.clear(Color::White);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        if !self.asleep {
            self.epd.sleep()?;
            self.asleep = true;
        }
        Ok(())
    }
}

/// Open the Waveshare panel on the Pi's SPI bus and GPIO character device.
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub fn open_waveshare(
    hw: &crate::config::DisplayHardwareConfig,
    rotation: Rotation,
) -> Result<Box<dyn Display>, DisplayError> {
    use crate::gpio_sysfs::{CdevInputPin, CdevOutputPin};
    use crate::hw_spi_spidev::SpidevHwSpi;
    use linux_embedded_hal::gpio_cdev::Chip;

    let mut chip =
        Chip::new("/dev/gpiochip0").map_err(|e| DisplayError::Hardware(e.to_string()))?;

    let dc = CdevOutputPin::new(&mut chip, hw.dc_pin as u32)?;
    let rst = CdevOutputPin::new(&mut chip, hw.rst_pin as u32)?;
    let busy = CdevInputPin::new(&mut chip, hw.busy_pin as u32)?;

    // Kernel SPI driver handles chip select
    let spi = SpidevHwSpi::new(&hw.spi_device)?;
    let epd = Epd4in2bV2::new(spi, None::<CdevOutputPin>, dc, rst, busy);

    Ok(Box::new(EinkDisplay::new(epd, rotation)?))
}
