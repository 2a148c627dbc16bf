//! SK9822 LED strip driver.
//!
//! Wire format, clocked out MSB first:
//!
//! ```text
//!   start frame:  00 00 00 00
//!   LED frame:    111bbbbb  blue  green  red
//! ```
//!
//! The start frame resets the strip's frame pointer; each following LED
//! frame lands on the next LED. `bbbbb` is the 5-bit global brightness. A
//! frame with zero color is dark whatever its brightness bits say.
//!
//! Only one byte is ever in flight: each byte waits for the transmitter to
//! go idle before it is loaded.

use log::debug;
use smart_leds::SmartLedsWrite;

use crate::error::StripError;
use crate::hal::SerialOut;
use crate::RGB8;

/// Largest value of the 5-bit global brightness field
pub const MAX_BRIGHTNESS: u8 = 0x1F;

/// High bits that mark a byte as the head of an LED frame
pub const LED_FRAME_MARKER: u8 = 0xE0;

pub const START_FRAME: [u8; 4] = [0; 4];

pub struct Sk9822<S> {
    serial: S,
    brightness: u8,
    busy_limit: u32,
}

impl<S: SerialOut> Sk9822<S> {
    /// Wrap a serial transmitter.
    ///
    /// `brightness` is masked to 5 bits. `busy_limit` bounds how many times a
    /// single byte polls a busy transmitter; 0 waits forever.
    pub fn new(serial: S, brightness: u8, busy_limit: u32) -> Self {
        Self {
            serial,
            brightness: brightness & MAX_BRIGHTNESS,
            busy_limit,
        }
    }

    #[inline]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), StripError> {
        let mut polls: u32 = 0;
        while self.serial.tx_busy() {
            polls = polls.saturating_add(1);
            if self.busy_limit != 0 && polls >= self.busy_limit {
                return Err(StripError::TxTimeout { polls });
            }
            core::hint::spin_loop();
        }
        self.serial.write_byte(byte).map_err(|e| {
            debug!("SK9822: serial write of {byte:#04x} failed: {e:?}");
            StripError::Serial
        })
    }

    /// Reset the strip's frame pointer to the first LED.
    pub fn start_frame(&mut self) -> Result<(), StripError> {
        for byte in START_FRAME {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Send one lit LED frame at the global brightness.
    pub fn led_frame(&mut self, color: RGB8) -> Result<(), StripError> {
        self.send_byte(LED_FRAME_MARKER | self.brightness)?;
        self.send_byte(color.b)?;
        self.send_byte(color.g)?;
        self.send_byte(color.r)
    }

    fn dark_frame(&mut self) -> Result<(), StripError> {
        self.send_byte(LED_FRAME_MARKER)?;
        self.send_byte(0)?;
        self.send_byte(0)?;
        self.send_byte(0)
    }

    /// Turn off `leds` LEDs from the start of the strip.
    pub fn clear(&mut self, leds: usize) -> Result<(), StripError> {
        self.start_frame()?;
        for _ in 0..leds {
            self.dark_frame()?;
        }
        Ok(())
    }

    /// Light the first `colors.len()` LEDs; LEDs past the end are not touched.
    pub fn show(&mut self, colors: &[RGB8]) -> Result<(), StripError> {
        self.write(colors.iter().copied())
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }
}

impl<S: SerialOut> SmartLedsWrite for Sk9822<S> {
    type Error = StripError;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        self.start_frame()?;
        for color in iterator {
            self.led_frame(color.into())?;
        }
        Ok(())
    }
}
