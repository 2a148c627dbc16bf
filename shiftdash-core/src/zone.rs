//! Shift-zone rendering.
//!
//! Engine speed maps to a bar of lit LEDs proportional to how close it is to
//! a redline set `redline_margin` below the absolute maximum:
//!
//! ```text
//!   lit = rpm * N / (max_rpm - redline_margin)
//! ```
//!
//! Once `lit` exceeds the strip length the engine is in the shift zone and
//! the whole strip flashes red, following the flash phase.

use log::trace;
use smart_leds::SmartLedsWrite;

use crate::config::StripConfig;
use crate::error::StripError;
use crate::hal::SerialOut;
use crate::sk9822::Sk9822;
use crate::RGB8;

/// Per-LED bar colors, partitioned into contiguous green/yellow/red bands.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedZoneTable {
    colors: Vec<RGB8>,
}

impl LedZoneTable {
    /// Build a table from `(count, color)` bands, in strip order.
    #[must_use]
    pub fn from_bands(bands: &[(usize, RGB8)]) -> Self {
        let colors = bands
            .iter()
            .flat_map(|&(count, color)| core::iter::repeat(color).take(count))
            .collect();
        Self { colors }
    }

    #[must_use]
    pub fn from_config(strip: &StripConfig) -> Self {
        Self::from_bands(&[
            (strip.green_leds, strip.green),
            (strip.yellow_leds, strip.yellow),
            (strip.red_leds, strip.red),
        ])
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[RGB8] {
        &self.colors
    }
}

/// What the strip should show for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripImage {
    /// The first `lit` LEDs in their zone colors, the rest dark
    Bar { lit: usize },
    /// Shift zone, flash phase on: every LED solid red
    FlashOn,
    /// Shift zone, flash phase off: strip blank
    FlashOff,
}

/// Speed-to-image mapping for one strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftZone {
    leds: usize,
    max_rpm: u32,
    redline_margin: u32,
    flash_color: RGB8,
}

impl ShiftZone {
    /// Build from a validated [`StripConfig`].
    #[must_use]
    pub const fn from_config(strip: &StripConfig) -> Self {
        Self {
            leds: strip.total_leds(),
            max_rpm: strip.max_rpm,
            redline_margin: strip.redline_margin,
            flash_color: strip.red,
        }
    }

    #[inline]
    #[must_use]
    pub const fn leds(&self) -> usize {
        self.leds
    }

    fn span(&self) -> u64 {
        u64::from(self.max_rpm.saturating_sub(self.redline_margin)).max(1)
    }

    /// LEDs the bar graph would light at `rpm`. May exceed the strip length.
    #[must_use]
    pub fn lit_count(&self, rpm: u32) -> usize {
        let lit = u64::from(rpm) * self.leds as u64 / self.span();
        usize::try_from(lit).unwrap_or(usize::MAX)
    }

    /// Lowest RPM at which the strip flashes.
    #[must_use]
    pub fn threshold_rpm(&self) -> u32 {
        let leds = self.leds as u64;
        let threshold = ((leds + 1) * self.span()).div_ceil(leds.max(1));
        u32::try_from(threshold).unwrap_or(u32::MAX)
    }

    /// Image for `rpm` at the given flash phase.
    #[must_use]
    pub fn image(&self, rpm: u32, flash_on: bool) -> StripImage {
        let lit = self.lit_count(rpm);
        if lit > self.leds {
            if flash_on {
                StripImage::FlashOn
            } else {
                StripImage::FlashOff
            }
        } else {
            StripImage::Bar { lit }
        }
    }

    /// Expected color of every LED once `image` is drawn.
    #[must_use]
    pub fn colors(&self, image: StripImage, table: &LedZoneTable) -> Vec<RGB8> {
        let mut leds = vec![RGB8::default(); self.leds];
        match image {
            StripImage::Bar { lit } => {
                for (led, color) in leds.iter_mut().zip(table.as_slice()).take(lit) {
                    *led = *color;
                }
            }
            StripImage::FlashOn => leds.fill(self.flash_color),
            StripImage::FlashOff => {}
        }
        leds
    }

    /// Draw `image` on the strip.
    ///
    /// The strip is always cleared first so a shorter bar never leaves LEDs
    /// from a previous, longer one lit.
    pub fn draw<S: SerialOut>(
        &self,
        strip: &mut Sk9822<S>,
        image: StripImage,
        table: &LedZoneTable,
    ) -> Result<(), StripError> {
        trace!("Drawing {image:?}");
        strip.clear(self.leds)?;
        match image {
            StripImage::Bar { lit } => {
                let lit = lit.min(table.len());
                strip.show(&table.as_slice()[..lit])
            }
            StripImage::FlashOn => {
                strip.write(core::iter::repeat(self.flash_color).take(self.leds))
            }
            StripImage::FlashOff => strip.clear(self.leds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StripModel;

    const GREEN: RGB8 = RGB8::new(0, 255, 0);
    const YELLOW: RGB8 = RGB8::new(255, 255, 0);
    const RED: RGB8 = RGB8::new(255, 0, 0);

    fn zone() -> (ShiftZone, LedZoneTable) {
        let strip = StripConfig::default();
        (ShiftZone::from_config(&strip), LedZoneTable::from_config(&strip))
    }

    #[test]
    fn test_table_bands() {
        let (_, table) = zone();
        assert_eq!(table.len(), 30);
        assert!(table.as_slice()[..18].iter().all(|&c| c == GREEN));
        assert!(table.as_slice()[18..24].iter().all(|&c| c == YELLOW));
        assert!(table.as_slice()[24..].iter().all(|&c| c == RED));
    }

    #[test]
    fn test_lit_count() {
        let (zone, _) = zone();
        assert_eq!(zone.lit_count(0), 0);
        // 6000 * 30 / 10500 = 17.1
        assert_eq!(zone.lit_count(6_000), 17);
        assert_eq!(zone.lit_count(10_500), 30);
        assert_eq!(zone.lit_count(12_000), 34);
    }

    #[test]
    fn test_lit_count_monotonic() {
        let (zone, _) = zone();
        let mut previous = 0;
        for rpm in (0..=15_000).step_by(7) {
            let lit = zone.lit_count(rpm);
            assert!(lit >= previous, "lit count fell at {rpm} RPM");
            previous = lit;
        }
    }

    #[test]
    fn test_threshold_is_first_flashing_rpm() {
        let (zone, _) = zone();
        let threshold = zone.threshold_rpm();
        assert_eq!(threshold, 10_850);
        assert!(matches!(zone.image(threshold - 1, true), StripImage::Bar { lit: 30 }));
        assert_eq!(zone.image(threshold, true), StripImage::FlashOn);
    }

    #[test]
    fn test_flash_images_above_threshold() {
        let (zone, table) = zone();
        for rpm in (zone.threshold_rpm()..20_000).step_by(97) {
            assert_eq!(zone.colors(zone.image(rpm, true), &table), vec![RED; 30]);
            assert_eq!(
                zone.colors(zone.image(rpm, false), &table),
                vec![RGB8::default(); 30]
            );
        }
    }

    #[test]
    fn test_bar_uses_table_colors_in_order() {
        let (zone, table) = zone();
        let colors = zone.colors(StripImage::Bar { lit: 20 }, &table);
        assert_eq!(&colors[..20], &table.as_slice()[..20]);
        assert!(colors[20..].iter().all(|&c| c == RGB8::default()));
    }

    #[test]
    fn test_draw_matches_expected_colors() {
        let (zone, table) = zone();
        let mut strip = Sk9822::new(StripModel::new(30), 3, 0);

        for image in [
            StripImage::Bar { lit: 0 },
            StripImage::Bar { lit: 12 },
            StripImage::Bar { lit: 30 },
            StripImage::FlashOn,
            StripImage::FlashOff,
        ] {
            zone.draw(&mut strip, image, &table).unwrap();
            assert_eq!(strip.serial().leds(), zone.colors(image, &table), "{image:?}");
        }
    }

    #[test]
    fn test_shorter_bar_leaves_no_ghosts() {
        let (zone, table) = zone();
        let mut strip = Sk9822::new(StripModel::new(30), 3, 0);

        zone.draw(&mut strip, StripImage::Bar { lit: 28 }, &table).unwrap();
        zone.draw(&mut strip, StripImage::Bar { lit: 5 }, &table).unwrap();

        let leds = strip.serial().leds();
        assert!(leds[..5].iter().all(|&c| c == GREEN));
        assert!(leds[5..].iter().all(|&c| c == RGB8::default()));
    }
}
