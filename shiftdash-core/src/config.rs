//! Startup configuration.
//!
//! Loaded once before the control loop starts and never changed afterwards.
//! Defaults describe the MSP432 dashboard board: a 48 MHz clock divided by
//! 64 for the tachometer counter, 8 tach pulses per revolution, and a
//! 30-LED strip split 18/6/6 into green, yellow and red bands.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sk9822::MAX_BRIGHTNESS;
use crate::RGB8;

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

/// Tachometer capture counter and pulse wiring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TachConfig {
    /// Clock feeding the capture counter (Hz)
    #[serde(default = "default_source_clock_hz")]
    pub source_clock_hz: u32,
    /// Divider between the source clock and the counter
    #[serde(default = "default_prescaler")]
    pub prescaler: u32,
    /// Tach pulses per engine revolution, as set in the ECU
    #[serde(default = "default_pulses_per_rev")]
    pub pulses_per_rev: u32,
}

const fn default_source_clock_hz() -> u32 {
    48_000_000
}

const fn default_prescaler() -> u32 {
    64
}

const fn default_pulses_per_rev() -> u32 {
    8
}

impl TachConfig {
    /// Counter tick rate in Hz (source clock / prescaler).
    #[must_use]
    pub const fn tick_rate_hz(&self) -> u32 {
        if self.prescaler == 0 {
            return 0;
        }
        self.source_clock_hz / self.prescaler
    }
}

impl Default for TachConfig {
    fn default() -> Self {
        Self {
            source_clock_hz: default_source_clock_hz(),
            prescaler: default_prescaler(),
            pulses_per_rev: default_pulses_per_rev(),
        }
    }
}

/// LED strip layout, colors and shift-zone thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StripConfig {
    #[serde(default = "default_green_leds")]
    pub green_leds: usize,
    #[serde(default = "default_yellow_leds")]
    pub yellow_leds: usize,
    #[serde(default = "default_red_leds")]
    pub red_leds: usize,
    #[serde(default = "default_green")]
    pub green: RGB8,
    #[serde(default = "default_yellow")]
    pub yellow: RGB8,
    #[serde(default = "default_red")]
    pub red: RGB8,
    /// 5-bit global brightness sent in every lit LED frame
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    /// Absolute maximum engine speed (RPM)
    #[serde(default = "default_max_rpm")]
    pub max_rpm: u32,
    /// How far below `max_rpm` the bar graph tops out (RPM)
    #[serde(default = "default_redline_margin")]
    pub redline_margin: u32,
    /// Busy polls allowed per byte before the transmitter is declared stuck
    #[serde(default = "default_tx_busy_limit")]
    pub tx_busy_limit: u32,
}

const fn default_green_leds() -> usize {
    18
}

const fn default_yellow_leds() -> usize {
    6
}

const fn default_red_leds() -> usize {
    6
}

const fn default_green() -> RGB8 {
    RGB8::new(0, 255, 0)
}

const fn default_yellow() -> RGB8 {
    RGB8::new(255, 255, 0)
}

const fn default_red() -> RGB8 {
    RGB8::new(255, 0, 0)
}

const fn default_brightness() -> u8 {
    3
}

const fn default_max_rpm() -> u32 {
    12_000
}

const fn default_redline_margin() -> u32 {
    1_500
}

const fn default_tx_busy_limit() -> u32 {
    100_000
}

impl StripConfig {
    /// Total LEDs on the strip.
    #[must_use]
    pub const fn total_leds(&self) -> usize {
        self.green_leds + self.yellow_leds + self.red_leds
    }
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            green_leds: default_green_leds(),
            yellow_leds: default_yellow_leds(),
            red_leds: default_red_leds(),
            green: default_green(),
            yellow: default_yellow(),
            red: default_red(),
            brightness: default_brightness(),
            max_rpm: default_max_rpm(),
            redline_margin: default_redline_margin(),
            tx_busy_limit: default_tx_busy_limit(),
        }
    }
}

/// Shift-zone flash timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashConfig {
    /// Time between flash phase toggles (ms)
    #[serde(default = "default_half_period_ms")]
    pub half_period_ms: u32,
}

const fn default_half_period_ms() -> u32 {
    33
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            half_period_ms: default_half_period_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub tach: TachConfig,
    #[serde(default)]
    pub strip: StripConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Config {
    /// Check every value the control loop divides by or packs into a
    /// fixed-width field.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tach.source_clock_hz == 0 {
            return Err(ConfigError::ZeroClock);
        }
        if self.tach.prescaler == 0 {
            return Err(ConfigError::ZeroPrescaler);
        }
        if self.tach.pulses_per_rev == 0 {
            return Err(ConfigError::ZeroPulsesPerRev);
        }
        if self.strip.total_leds() == 0 {
            return Err(ConfigError::EmptyStrip);
        }
        if self.strip.redline_margin >= self.strip.max_rpm {
            return Err(ConfigError::RedlineMargin {
                margin: self.strip.redline_margin,
                max_rpm: self.strip.max_rpm,
            });
        }
        if self.strip.brightness > MAX_BRIGHTNESS {
            return Err(ConfigError::Brightness {
                value: self.strip.brightness,
            });
        }
        if self.flash.half_period_ms == 0 {
            return Err(ConfigError::ZeroFlashPeriod);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_board() {
        let config = Config::default();
        assert_eq!(config.tach.tick_rate_hz(), 750_000);
        assert_eq!(config.tach.pulses_per_rev, 8);
        assert_eq!(config.strip.total_leds(), 30);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "strip": { "brightness": 10 }, "log_level": "debug" }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.strip.brightness, 10);
        assert_eq!(config.strip.max_rpm, 12_000);
        assert_eq!(config.tach, TachConfig::default());
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_rejects_margin_at_or_above_max() {
        let mut config = Config::default();
        config.strip.redline_margin = config.strip.max_rpm;
        assert_eq!(
            config.validate(),
            Err(ConfigError::RedlineMargin {
                margin: 12_000,
                max_rpm: 12_000
            })
        );
    }

    #[test]
    fn test_rejects_wide_brightness() {
        let mut config = Config::default();
        config.strip.brightness = 32;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Brightness { value: 32 })
        );
    }

    #[test]
    fn test_rejects_zero_divisors() {
        let mut config = Config::default();
        config.tach.pulses_per_rev = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPulsesPerRev));

        let mut config = Config::default();
        config.tach.prescaler = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPrescaler));
        assert_eq!(config.tach.tick_rate_hz(), 0);

        let mut config = Config::default();
        config.strip.green_leds = 0;
        config.strip.yellow_leds = 0;
        config.strip.red_leds = 0;
        assert_eq!(config.validate(), Err(ConfigError::EmptyStrip));
    }
}
