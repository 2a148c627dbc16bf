//! Error types.
//!
//! The control loop itself has no error channel: a strip fault is logged
//! and the next tachometer sample retries the render. These types exist so
//! the faults can be reported and counted instead of hanging the loop.

use derive_more::{Display, Error, From};

/// Startup configuration rejected by [`Config::validate`](crate::Config::validate).
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ConfigError {
    #[display("tachometer source clock must be non-zero")]
    ZeroClock,
    #[display("tachometer prescaler must be non-zero")]
    ZeroPrescaler,
    #[display("pulses per revolution must be non-zero")]
    ZeroPulsesPerRev,
    #[display("LED strip has no LEDs")]
    EmptyStrip,
    #[display("redline margin {margin} must be below max RPM {max_rpm}")]
    RedlineMargin { margin: u32, max_rpm: u32 },
    #[display("brightness {value} does not fit the 5-bit global brightness field")]
    Brightness { value: u8 },
    #[display("flash half-period must be non-zero")]
    ZeroFlashPeriod,
}

/// Failure while clocking a frame out to the LED strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum StripError {
    /// The transmitter never went idle within the configured poll budget
    #[display("serial transmitter busy after {polls} polls")]
    TxTimeout { polls: u32 },
    /// The transport rejected a byte
    #[display("serial write failed")]
    Serial,
}

#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[display("invalid configuration: {_0}")]
    Config(ConfigError),
}
