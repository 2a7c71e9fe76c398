//! Waveshare 4.2" B/W/Red V2 e-paper driver
//!
//! Command sequences follow the Waveshare reference code for the SSD1683
//! controller. The driver is blocking and needs `&mut self` for every call; the
//! display gate in [`crate::display`] serializes access and runs it off the async
//! executor.

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Display dimensions
pub const EPD_WIDTH: u32 = 400;
pub const EPD_HEIGHT: u32 = 300;

/// Poll interval and limit while waiting for the BUSY line (5 seconds total)
const BUSY_POLL: Duration = Duration::from_millis(10);
const BUSY_MAX_POLLS: u32 = 500;

/// Panel colors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White = 0xFF,
    Black = 0x00,
    Red = 0x80,
}

/// Panel orientation, clockwise
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

/// Simple error type for our EPD operations
#[derive(Debug)]
pub struct EpdError(pub String);

impl std::fmt::Display for EpdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPD Error: {}", self.0)
    }
}

impl std::error::Error for EpdError {}

/// Byte-level SPI interface
pub trait SoftwareSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError>;
    fn read_byte(&mut self) -> Result<u8, EpdError>;
}

/// Trait for GPIO pin interface
pub trait GpioPin {
    fn set_high(&mut self) -> Result<(), EpdError>;
    fn set_low(&mut self) -> Result<(), EpdError>;
}

/// Trait for input pin interface
pub trait InputPin {
    fn is_high(&self) -> Result<bool, EpdError>;
}

/// `None` stands for a chip select handled by the kernel SPI driver.
impl<P: GpioPin> GpioPin for Option<P> {
    fn set_high(&mut self) -> Result<(), EpdError> {
        match self {
            Some(pin) => pin.set_high(),
            None => Ok(()),
        }
    }

    fn set_low(&mut self) -> Result<(), EpdError> {
        match self {
            Some(pin) => pin.set_low(),
            None => Ok(()),
        }
    }
}

/// EPD 4.2" B/W/Red V2 display driver
pub struct Epd4in2bV2<SPI, CS, DC, RST, BUSY> {
    spi: SPI,
    cs_pin: CS,
    dc_pin: DC,
    rst_pin: RST,
    busy_pin: BUSY,
    width: u32,
    height: u32,
}

/// Frame buffer for the 4.2" B/W/Red display.
///
/// Drawing goes through [`DrawTarget`] in logical (rotated) coordinates;
/// the buffers themselves are always in panel order.
pub struct DisplayBuffer {
    width: u32,
    height: u32,
    rotation: Rotation,
    black_buffer: Vec<u8>,
    red_buffer: Vec<u8>,
}

impl DisplayBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_rotation(width, height, Rotation::Deg0)
    }

    pub fn with_rotation(width: u32, height: u32, rotation: Rotation) -> Self {
        // Buffer size: each row has (width+7)/8 bytes, total height rows
        let bytes_per_row = width.div_ceil(8);
        let buffer_size = (bytes_per_row * height) as usize;
        Self {
            width,
            height,
            rotation,
            black_buffer: vec![0xFF; buffer_size], // White by default
            red_buffer: vec![0x00; buffer_size],   // No red by default
        }
    }

    pub fn clear(&mut self, color: Color) {
        match color {
            Color::White => {
                self.black_buffer.fill(0xFF);
                self.red_buffer.fill(0x00);
            }
            Color::Black => {
                self.black_buffer.fill(0x00);
                self.red_buffer.fill(0x00);
            }
            Color::Red => {
                self.black_buffer.fill(0xFF);
                self.red_buffer.fill(0xFF);
            }
        }
    }

    pub fn black_buffer(&self) -> &[u8] {
        &self.black_buffer
    }

    pub fn red_buffer(&self) -> &[u8] {
        &self.red_buffer
    }

    /// Number of black pixels currently set.
    pub fn black_pixel_count(&self) -> u32 {
        self.black_buffer.iter().map(|&b| b.count_zeros()).sum()
    }

    /// Set a pixel in panel coordinates (rotation not applied).
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }

        // Each row has (width/8) bytes, each byte represents 8 horizontal pixels
        let bytes_per_row = self.width.div_ceil(8);
        let byte_index = (y * bytes_per_row + x / 8) as usize;
        let bit_mask = 0x80 >> (x % 8);

        match color {
            Color::White => {
                self.black_buffer[byte_index] |= bit_mask;
                self.red_buffer[byte_index] &= !bit_mask;
            }
            Color::Black => {
                self.black_buffer[byte_index] &= !bit_mask;
                self.red_buffer[byte_index] &= !bit_mask;
            }
            Color::Red => {
                self.black_buffer[byte_index] |= bit_mask;
                self.red_buffer[byte_index] |= bit_mask;
            }
        }
    }

    /// Whether the pixel at panel coordinates is black.
    pub fn is_black(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let bytes_per_row = self.width.div_ceil(8);
        let byte_index = (y * bytes_per_row + x / 8) as usize;
        self.black_buffer[byte_index] & (0x80 >> (x % 8)) == 0
    }

    /// Map logical coordinates to panel coordinates.
    fn to_panel(&self, x: u32, y: u32) -> (u32, u32) {
        match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (self.width - 1 - y, x),
            Rotation::Deg180 => (self.width - 1 - x, self.height - 1 - y),
            Rotation::Deg270 => (y, self.height - 1 - x),
        }
    }
}

impl OriginDimensions for DisplayBuffer {
    fn size(&self) -> Size {
        match self.rotation {
            Rotation::Deg0 | Rotation::Deg180 => Size::new(self.width, self.height),
            Rotation::Deg90 | Rotation::Deg270 => Size::new(self.height, self.width),
        }
    }
}

impl DrawTarget for DisplayBuffer {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let size = self.size();
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x >= size.width || y >= size.height {
                continue;
            }
            let (px, py) = self.to_panel(x, y);
            let color = match color {
                BinaryColor::On => Color::Black,
                BinaryColor::Off => Color::White,
            };
            self.set_pixel(px, py, color);
        }
        Ok(())
    }
}

impl<SPI, CS, DC, RST, BUSY> Epd4in2bV2<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    /// Create a new EPD instance
    pub fn new(spi: SPI, cs_pin: CS, dc_pin: DC, rst_pin: RST, busy_pin: BUSY) -> Self {
        Self {
            spi,
            cs_pin,
            dc_pin,
            rst_pin,
            busy_pin,
            width: EPD_WIDTH,
            height: EPD_HEIGHT,
        }
    }

    fn reset(&mut self) -> Result<(), EpdError> {
        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));

        self.rst_pin.set_low()?;
        thread::sleep(Duration::from_millis(5));

        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));

        trace!("hardware reset completed");
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
        self.dc_pin.set_low()?; // Command mode
        self.cs_pin.set_low()?;
        self.spi.write_byte(command)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    fn send_data(&mut self, data: u8) -> Result<(), EpdError> {
        self.dc_pin.set_high()?; // Data mode
        self.cs_pin.set_low()?;
        self.spi.write_byte(data)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    /// Wait while BUSY is high (rev2.2+ modules are active high).
    fn read_busy(&mut self) -> Result<(), EpdError> {
        let mut polls = 0;
        while self.busy_pin.is_high()? {
            thread::sleep(BUSY_POLL);
            polls += 1;
            if polls > BUSY_MAX_POLLS {
                return Err(EpdError("BUSY line stuck high for 5 seconds".to_string()));
            }
        }
        trace!(polls, "display ready");
        Ok(())
    }

    fn turn_on_display(&mut self) -> Result<(), EpdError> {
        self.send_command(0x22)?; // Display update control
        self.send_data(0xF7)?;
        self.send_command(0x20)?; // Master activation
        self.read_busy()
    }

    /// Initialize the display
    pub fn init(&mut self) -> Result<(), EpdError> {
        debug!("initializing EPD");

        self.reset()?;

        self.read_busy()?;
        self.send_command(0x12)?; // SWRESET
        self.read_busy()?;

        self.send_command(0x3C)?; // BorderWaveform
        self.send_data(0x05)?;

        self.send_command(0x18)?; // Read built-in temperature sensor
        self.send_data(0x80)?;

        self.send_command(0x11)?; // Data entry mode setting
        self.send_data(0x03)?;

        // Set RAM X address start/end
        self.send_command(0x44)?;
        self.send_data(0x00)?;
        self.send_data((self.width / 8 - 1) as u8)?;

        // Set RAM Y address start/end
        self.send_command(0x45)?;
        self.send_data(0x00)?;
        self.send_data(0x00)?;
        self.send_data(((self.height - 1) % 256) as u8)?;
        self.send_data(((self.height - 1) / 256) as u8)?;

        // Set RAM X address counter
        self.send_command(0x4E)?;
        self.send_data(0x00)?;

        // Set RAM Y address counter
        self.send_command(0x4F)?;
        self.send_data(0x00)?;
        self.send_data(0x00)?;

        self.read_busy()?;

        debug!("EPD initialized");
        Ok(())
    }

    /// Send both color planes and refresh the panel
    pub fn display(&mut self, black_buffer: &[u8], red_buffer: &[u8]) -> Result<(), EpdError> {
        let wide = self.width.div_ceil(8) as usize;
        let expected = wide * self.height as usize;
        if black_buffer.len() != expected || red_buffer.len() != expected {
            return Err(EpdError(format!(
                "buffer size mismatch: expected {expected} bytes, got black={} red={}",
                black_buffer.len(),
                red_buffer.len()
            )));
        }

        self.send_command(0x24)?; // Black plane
        for &byte in black_buffer {
            self.send_data(byte)?;
        }

        self.send_command(0x26)?; // Red plane
        for &byte in red_buffer {
            self.send_data(!byte)?; // Inverted as per reference code
        }

        self.turn_on_display()?;
        debug!(bytes = expected, "frame sent to panel");
        Ok(())
    }

    /// Clear the display to white
    pub fn clear(&mut self) -> Result<(), EpdError> {
        let bytes = self.width.div_ceil(8) as usize * self.height as usize;

        self.send_command(0x24)?;
        for _ in 0..bytes {
            self.send_data(0xFF)?; // White
        }

        self.send_command(0x26)?;
        for _ in 0..bytes {
            self.send_data(0x00)?; // No red
        }

        self.turn_on_display()?;
        debug!("panel cleared");
        Ok(())
    }

    /// Power off and enter deep sleep. The last image persists without power;
    /// a new [`init`](Self::init) is required before the next frame.
    pub fn sleep(&mut self) -> Result<(), EpdError> {
        self.send_command(0x02)?; // POWER_OFF
        self.read_busy()?;

        self.send_command(0x10)?; // DEEP_SLEEP
        self.send_data(0x01)?;

        debug!("panel in deep sleep");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every byte with the DC level it was sent under.
    #[derive(Clone, Default)]
    pub(crate) struct Wire {
        pub dc_high: Arc<Mutex<bool>>,
        pub log: Arc<Mutex<Vec<(bool, u8)>>>,
    }

    pub(crate) struct FakeSpi(pub Wire);
    pub(crate) struct FakeDc(pub Wire);
    pub(crate) struct FakePin;
    pub(crate) struct FakeBusy(pub bool);

    impl SoftwareSpi for FakeSpi {
        fn write_byte(&mut self, data: u8) -> Result<(), EpdError> {
            let dc = *self.0.dc_high.lock().unwrap();
            self.0.log.lock().unwrap().push((dc, data));
            Ok(())
        }
        fn read_byte(&mut self) -> Result<u8, EpdError> {
            Ok(0)
        }
    }

    impl GpioPin for FakeDc {
        fn set_high(&mut self) -> Result<(), EpdError> {
            *self.0.dc_high.lock().unwrap() = true;
            Ok(())
        }
        fn set_low(&mut self) -> Result<(), EpdError> {
            *self.0.dc_high.lock().unwrap() = false;
            Ok(())
        }
    }

    impl GpioPin for FakePin {
        fn set_high(&mut self) -> Result<(), EpdError> {
            Ok(())
        }
        fn set_low(&mut self) -> Result<(), EpdError> {
            Ok(())
        }
    }

    impl InputPin for FakeBusy {
        fn is_high(&self) -> Result<bool, EpdError> {
            Ok(self.0)
        }
    }

    pub(crate) type FakeEpd = Epd4in2bV2<FakeSpi, Option<FakePin>, FakeDc, FakePin, FakeBusy>;

    pub(crate) fn fake_epd(busy: bool) -> (FakeEpd, Wire) {
        let wire = Wire::default();
        let epd = Epd4in2bV2::new(
            FakeSpi(wire.clone()),
            None,
            FakeDc(wire.clone()),
            FakePin,
            FakeBusy(busy),
        );
        (epd, wire)
    }

    fn commands(wire: &Wire) -> Vec<u8> {
        wire.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(dc, _)| !dc)
            .map(|(_, b)| *b)
            .collect()
    }

    #[test]
    fn display_sends_both_planes_then_refreshes() {
        let (mut epd, wire) = fake_epd(false);
        let buffer = DisplayBuffer::new(EPD_WIDTH, EPD_HEIGHT);

        epd.display(buffer.black_buffer(), buffer.red_buffer()).unwrap();

        assert_eq!(commands(&wire), vec![0x24, 0x26, 0x22, 0x20]);
        let data_bytes = wire.log.lock().unwrap().iter().filter(|(dc, _)| *dc).count();
        // two planes of 50x300 bytes plus the 0xF7 update control byte
        assert_eq!(data_bytes, 2 * 50 * 300 + 1);
    }

    #[test]
    fn display_rejects_wrong_buffer_size() {
        let (mut epd, _) = fake_epd(false);
        assert!(epd.display(&[0xFF; 10], &[0x00; 10]).is_err());
    }

    #[test]
    fn sleep_powers_off_then_deep_sleeps() {
        let (mut epd, wire) = fake_epd(false);
        epd.sleep().unwrap();
        assert_eq!(commands(&wire), vec![0x02, 0x10]);
    }

    #[test]
    fn stuck_busy_line_is_an_error() {
        let (mut epd, _) = fake_epd(true);
        assert!(epd.sleep().is_err());
    }

    #[test]
    fn buffer_set_pixel_and_clear() {
        let mut buffer = DisplayBuffer::new(16, 2);
        buffer.set_pixel(9, 1, Color::Black);
        assert!(buffer.is_black(9, 1));
        assert_eq!(buffer.black_pixel_count(), 1);

        buffer.set_pixel(100, 100, Color::Black); // out of range is ignored
        assert_eq!(buffer.black_pixel_count(), 1);

        buffer.clear(Color::White);
        assert_eq!(buffer.black_pixel_count(), 0);
    }

    #[test]
    fn draw_target_applies_rotation() {
        let mut upright = DisplayBuffer::new(EPD_WIDTH, EPD_HEIGHT);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut upright).unwrap();
        assert!(upright.is_black(0, 0));

        let mut flipped = DisplayBuffer::with_rotation(EPD_WIDTH, EPD_HEIGHT, Rotation::Deg180);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut flipped).unwrap();
        assert!(flipped.is_black(EPD_WIDTH - 1, EPD_HEIGHT - 1));

        let mut portrait = DisplayBuffer::with_rotation(EPD_WIDTH, EPD_HEIGHT, Rotation::Deg90);
        assert_eq!(portrait.size(), Size::new(EPD_HEIGHT, EPD_WIDTH));
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut portrait).unwrap();
        assert!(portrait.is_black(EPD_WIDTH - 1, 0));

        let mut portrait = DisplayBuffer::with_rotation(EPD_WIDTH, EPD_HEIGHT, Rotation::Deg270);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut portrait).unwrap();
        assert!(portrait.is_black(0, EPD_HEIGHT - 1));
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }
}
