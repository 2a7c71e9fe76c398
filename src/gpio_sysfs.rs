//! Panel control lines on the GPIO character device.

use crate::epd4in2b_v2::{EpdError, GpioPin, InputPin};
use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};

const CONSUMER: &str = "frida-freq";

fn request(chip: &mut Chip, offset: u32, flags: LineRequestFlags) -> Result<LineHandle, EpdError> {
    chip.get_line(offset)
        .and_then(|line| line.request(flags, 0, CONSUMER))
        .map_err(|e| EpdError(format!("GPIO line {offset}: {e}")))
}

pub struct CdevOutputPin {
    line: LineHandle,
}

pub struct CdevInputPin {
    line: LineHandle,
}

impl CdevOutputPin {
    pub fn new(chip: &mut Chip, offset: u32) -> Result<Self, EpdError> {
        Ok(Self {
            line: request(chip, offset, LineRequestFlags::OUTPUT)?,
        })
    }
}

impl CdevInputPin {
    pub fn new(chip: &mut Chip, offset: u32) -> Result<Self, EpdError> {
        Ok(Self {
            line: request(chip, offset, LineRequestFlags::INPUT)?,
        })
    }
}

impl GpioPin for CdevOutputPin {
    fn set_high(&mut self) -> Result<(), EpdError> {
        self.line.set_value(1).map_err(|e| EpdError(e.to_string()))
    }

    fn set_low(&mut self) -> Result<(), EpdError> {
        self.line.set_value(0).map_err(|e| EpdError(e.to_string()))
    }
}

impl InputPin for CdevInputPin {
    fn is_high(&self) -> Result<bool, EpdError> {
        let value = self.line.get_value().map_err(|e| EpdError(e.to_string()))?;
        Ok(value == 1)
    }
}
