//! Displayed gear and the 7-segment gear readout.

use crate::hal::ParallelOut;

pub const LOWEST_GEAR: u8 = 1;
pub const HIGHEST_GEAR: u8 = 6;

/// Segments to switch on for each digit 0-9.
pub const SEGMENTS_ON: [u8; 10] = [0x77, 0x05, 0xB3, 0xA7, 0xC5, 0xE6, 0xF6, 0x07, 0xF7, 0xE7];

/// Segments to switch off for each digit 0-9 (complement of [`SEGMENTS_ON`]).
pub const SEGMENTS_OFF: [u8; 10] = [0x88, 0xFA, 0x4C, 0x58, 0x3A, 0x19, 0x09, 0xF8, 0x08, 0x18];

/// Currently displayed gear, always in `1..=6`.
///
/// Only moves one step at a time, and only when a shift is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GearIndex(u8);

impl GearIndex {
    pub const FIRST: Self = Self(LOWEST_GEAR);

    /// `None` outside `1..=6`.
    #[must_use]
    pub const fn new(gear: u8) -> Option<Self> {
        if gear >= LOWEST_GEAR && gear <= HIGHEST_GEAR {
            Some(Self(gear))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Step up one gear. Returns `false` (and stays put) in top gear.
    pub fn advance(&mut self) -> bool {
        if self.0 < HIGHEST_GEAR {
            self.0 += 1;
            true
        } else {
            false
        }
    }

    /// Step down one gear. Returns `false` (and stays put) in first gear.
    pub fn retreat(&mut self) -> bool {
        if self.0 > LOWEST_GEAR {
            self.0 -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for GearIndex {
    fn default() -> Self {
        Self::FIRST
    }
}

impl core::fmt::Display for GearIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 7-segment digit on an 8-bit output port.
pub struct GearDisplay<P> {
    port: P,
}

impl<P: ParallelOut> GearDisplay<P> {
    /// Take the port and blank every segment.
    pub fn new(mut port: P) -> Self {
        port.write(0);
        Self { port }
    }

    /// Show `gear`.
    ///
    /// The new digit's segments are switched on first, then the segments it
    /// does not use are switched off, so nothing from the previous digit stays lit.
    pub fn show(&mut self, gear: GearIndex) {
        let digit = usize::from(gear.get());
        self.port.set_bits(SEGMENTS_ON[digit]);
        self.port.clear_bits(SEGMENTS_OFF[digit]);
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;

    #[test]
    fn test_tables_are_complements() {
        for digit in 0..10 {
            assert_eq!(SEGMENTS_ON[digit] & SEGMENTS_OFF[digit], 0, "digit {digit}");
            assert_eq!(SEGMENTS_ON[digit] | SEGMENTS_OFF[digit], 0xFF, "digit {digit}");
        }
    }

    #[test]
    fn test_gear_range() {
        assert_eq!(GearIndex::new(0), None);
        assert_eq!(GearIndex::new(7), None);
        assert_eq!(GearIndex::new(6).map(GearIndex::get), Some(6));
        assert_eq!(GearIndex::default(), GearIndex::FIRST);
    }

    #[test]
    fn test_advance_and_retreat_clamp() {
        let mut gear = GearIndex::new(5).unwrap();
        assert!(gear.advance());
        assert_eq!(gear.get(), 6);
        assert!(!gear.advance());
        assert_eq!(gear.get(), 6);

        let mut gear = GearIndex::new(2).unwrap();
        assert!(gear.retreat());
        assert!(!gear.retreat());
        assert_eq!(gear.get(), 1);
    }

    #[test]
    fn test_show_leaves_exact_pattern() {
        let mut display = GearDisplay::new(MockPort::default());
        for gear in (1..=6).chain((1..=5).rev()) {
            display.show(GearIndex::new(gear).unwrap());
            assert_eq!(display.port().value(), SEGMENTS_ON[usize::from(gear)]);
        }
    }

    #[test]
    fn test_show_sets_before_clearing() {
        let mut display = GearDisplay::new(MockPort::default());
        // 8 lights every segment 3 uses, plus some it does not
        display.port.write(SEGMENTS_ON[8]);
        display.show(GearIndex::new(3).unwrap());

        let set = SEGMENTS_ON[8] | SEGMENTS_ON[3];
        let writes = display.port().writes();
        assert_eq!(writes[writes.len() - 2..], [set, set & !SEGMENTS_OFF[3]]);
        assert_eq!(display.port().value(), SEGMENTS_ON[3]);
    }
}
