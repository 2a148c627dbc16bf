//! Simulated peripherals.
//!
//! Stand-ins for the capability traits in [`crate::hal`], used by the unit
//! tests and by the host simulator. [`StripModel`] decodes the SK9822 wire
//! format the way the strip does, so tests can assert on what is actually lit.

use crate::hal::{CompareTimer, ParallelOut, SerialOut, TimerCapture};
use crate::sk9822::{LED_FRAME_MARKER, MAX_BRIGHTNESS, START_FRAME};
use crate::RGB8;

/// Free-running capture counter driven by [`advance`](Self::advance).
#[derive(Debug, Default, Clone)]
pub struct MockCounter {
    now: u32,
    base: u32,
}

impl MockCounter {
    pub fn advance(&mut self, ticks: u32) {
        self.now = self.now.wrapping_add(ticks);
    }
}

impl TimerCapture for MockCounter {
    fn capture(&mut self) -> u32 {
        self.now.wrapping_sub(self.base)
    }

    fn reset(&mut self) {
        self.base = self.now;
    }
}

/// Compare timer with a manually advanced count.
#[derive(Debug, Default, Clone)]
pub struct MockCompareTimer {
    now: u32,
    compare: u32,
}

impl MockCompareTimer {
    #[must_use]
    pub fn now(&self) -> u32 {
        self.now
    }

    pub fn advance_to(&mut self, now: u32) {
        self.now = now;
    }
}

impl CompareTimer for MockCompareTimer {
    fn compare(&self) -> u32 {
        self.compare
    }

    fn set_compare(&mut self, value: u32) {
        self.compare = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSerialError;

/// Serial transmitter that records every byte.
#[derive(Debug, Default, Clone)]
pub struct RecordingSerial {
    bytes: Vec<u8>,
    busy_per_byte: u32,
    busy_left: u32,
    busy_seen: u32,
    stuck: bool,
    fail_after: Option<usize>,
}

impl RecordingSerial {
    /// Report busy `polls` times before accepting each byte.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_per_byte = polls;
        self.busy_left = polls;
    }

    /// Report busy forever.
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Reject every byte after the first `count`.
    pub fn fail_after(&mut self, count: usize) {
        self.fail_after = Some(count);
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn busy_polls_seen(&self) -> u32 {
        self.busy_seen
    }
}

impl SerialOut for RecordingSerial {
    type Error = MockSerialError;

    fn tx_busy(&mut self) -> bool {
        if self.stuck {
            self.busy_seen += 1;
            return true;
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            self.busy_seen += 1;
            return true;
        }
        false
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        if self.fail_after.is_some_and(|limit| self.bytes.len() >= limit) {
            return Err(MockSerialError);
        }
        self.bytes.push(byte);
        self.busy_left = self.busy_per_byte;
        Ok(())
    }
}

/// An SK9822 strip on the end of the serial line.
///
/// Bytes are grouped into 4-byte frames. A start frame rewinds the frame
/// pointer; an LED frame latches its color into the LED under the pointer
/// and moves on. Frames past the last LED fall off the end.
#[derive(Debug, Clone)]
pub struct StripModel {
    leds: Vec<RGB8>,
    brightness: Vec<u8>,
    pointer: usize,
    word: [u8; 4],
    fill: usize,
    start_frames: usize,
}

impl StripModel {
    #[must_use]
    pub fn new(leds: usize) -> Self {
        Self {
            leds: vec![RGB8::default(); leds],
            brightness: vec![0; leds],
            pointer: 0,
            word: [0; 4],
            fill: 0,
            start_frames: 0,
        }
    }

    /// Color latched in every LED.
    #[must_use]
    pub fn leds(&self) -> Vec<RGB8> {
        self.leds.clone()
    }

    /// Global brightness latched in every LED.
    #[must_use]
    pub fn brightness(&self) -> &[u8] {
        &self.brightness
    }

    /// LEDs showing any light.
    #[must_use]
    pub fn lit_count(&self) -> usize {
        self.leds
            .iter()
            .zip(&self.brightness)
            .filter(|&(color, &brightness)| *color != RGB8::default() && brightness != 0)
            .count()
    }

    #[must_use]
    pub fn start_frames(&self) -> usize {
        self.start_frames
    }

    fn latch(&mut self) {
        let word = self.word;
        if word == START_FRAME {
            self.pointer = 0;
            self.start_frames += 1;
        } else if word[0] & LED_FRAME_MARKER == LED_FRAME_MARKER {
            if let Some(led) = self.leds.get_mut(self.pointer) {
                *led = RGB8::new(word[3], word[2], word[1]);
                self.brightness[self.pointer] = word[0] & MAX_BRIGHTNESS;
            }
            self.pointer += 1;
        }
    }
}

impl SerialOut for StripModel {
    type Error = MockSerialError;

    fn tx_busy(&mut self) -> bool {
        false
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.word[self.fill] = byte;
        self.fill += 1;
        if self.fill == self.word.len() {
            self.fill = 0;
            self.latch();
        }
        Ok(())
    }
}

/// Output port that remembers every value written to it.
#[derive(Debug, Default, Clone)]
pub struct MockPort {
    value: u8,
    writes: Vec<u8>,
}

impl MockPort {
    #[must_use]
    pub fn value(&self) -> u8 {
        self.value
    }

    #[must_use]
    pub fn writes(&self) -> &[u8] {
        &self.writes
    }
}

impl ParallelOut for MockPort {
    fn read(&self) -> u8 {
        self.value
    }

    fn write(&mut self, value: u8) {
        self.value = value;
        self.writes.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_model_decodes_frames() {
        let mut strip = StripModel::new(3);
        for byte in [0, 0, 0, 0, 0xE5, 1, 2, 3, 0xE5, 4, 5, 6] {
            strip.write_byte(byte).unwrap();
        }
        assert_eq!(
            strip.leds(),
            [RGB8::new(3, 2, 1), RGB8::new(6, 5, 4), RGB8::default()]
        );
        assert_eq!(strip.brightness(), [5, 5, 0]);
        assert_eq!(strip.lit_count(), 2);
        assert_eq!(strip.start_frames(), 1);
    }

    #[test]
    fn test_strip_model_start_frame_rewinds() {
        let mut strip = StripModel::new(2);
        for byte in [0, 0, 0, 0, 0xE1, 9, 9, 9, 0, 0, 0, 0, 0xE1, 0, 0, 7] {
            strip.write_byte(byte).unwrap();
        }
        assert_eq!(strip.leds()[0], RGB8::new(7, 0, 0));
        assert_eq!(strip.leds()[1], RGB8::default());
    }

    #[test]
    fn test_counter_capture_since_reset() {
        let mut counter = MockCounter::default();
        counter.advance(10);
        assert_eq!(counter.capture(), 10);
        counter.reset();
        counter.advance(3);
        assert_eq!(counter.capture(), 3);
    }
}
