//! Real-time control core for the shift-light dashboard
//!
//! This library holds everything the dashboard does between its pins:
//! measuring engine speed from the tachometer pulse line, rendering it onto
//! an SK9822 strip with a flashing "shift now" zone, and interlocking the
//! paddle-shift relays against the hall-effect gear confirmation sensors.
//!
//! It is hardware-agnostic. Peripherals are reached through the small
//! capability traits in [`hal`], so the same logic runs on the ESP32
//! firmware and on a host with the simulated peripherals in [`mock`].
//!
//! Interrupt-side state lives in [`Shared`] (lock-free, single writer per
//! field); everything else is owned by the main-loop [`Controller`].

pub mod config;
pub mod controller;
pub mod error;
pub mod flash;
pub mod gear;
pub mod hal;
pub mod interlock;
pub mod mock;
pub mod sk9822;
pub mod tach;
pub mod zone;

pub use config::{Config, LogLevel};
pub use controller::{Controller, Shared};
pub use error::{ConfigError, Error, StripError};
pub use gear::{GearDisplay, GearIndex};
pub use interlock::{GearSignal, RelayBank, RelayState, ShiftInterlock};
pub use rgb::RGB8;
pub use zone::{LedZoneTable, ShiftZone, StripImage};
