//! Capability traits the control core drives its peripherals through.
//!
//! Each trait covers exactly what one subsystem needs from the hardware.
//! The firmware binds them to ESP32 peripherals; tests and the simulator
//! bind them to the types in [`crate::mock`].

use core::sync::atomic::{AtomicU8, Ordering};

use enumset::{EnumSet, EnumSetType};

/// Free-running counter sampled on every tachometer edge.
pub trait TimerCapture {
    /// Ticks elapsed since the last [`reset`](Self::reset).
    fn capture(&mut self) -> u32;

    /// Restart counting from zero.
    fn reset(&mut self);
}

/// Timer with a compare register that raises an interrupt on match.
pub trait CompareTimer {
    fn compare(&self) -> u32;
    fn set_compare(&mut self, value: u32);
}

/// Logical edge inputs sharing one interrupt vector.
///
/// Declaration order is service priority: paddles before confirmations,
/// up before down.
#[derive(Debug, EnumSetType)]
pub enum EdgeLine {
    /// Up-shift paddle pulled
    UpPaddle,
    /// Down-shift paddle pulled
    DownPaddle,
    /// Hall sensor saw a completed upshift
    UpConfirm,
    /// Hall sensor saw a completed downshift
    DownConfirm,
}

/// Edge-triggered input group with per-line pending flags.
pub trait EdgeInput {
    /// Lines with an edge that has not been acknowledged yet.
    fn pending(&self) -> EnumSet<EdgeLine>;

    /// Clear the pending flag of `line` only.
    fn acknowledge(&mut self, line: EdgeLine);
}

/// Byte-wide synchronous serial transmitter (MSB first, clock idle high).
pub trait SerialOut {
    type Error: core::fmt::Debug;

    /// Whether the transmit buffer still holds a byte in flight.
    fn tx_busy(&mut self) -> bool;

    /// Load one byte into the transmit buffer.
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}

/// 8-bit parallel output port.
pub trait ParallelOut {
    /// Current output latch value.
    fn read(&self) -> u8;

    fn write(&mut self, value: u8);

    #[inline]
    fn set_bits(&mut self, mask: u8) {
        let value = self.read() | mask;
        self.write(value);
    }

    #[inline]
    fn clear_bits(&mut self, mask: u8) {
        let value = self.read() & !mask;
        self.write(value);
    }
}

/// Lock-free pending-edge latch.
///
/// Interrupt callbacks [`raise`](Self::raise) a line; the interlock handler
/// reads and acknowledges lines one at a time through [`EdgeInput`], so an
/// edge raised while another is being serviced is never lost.
#[derive(Debug, Default)]
pub struct EdgeLatch {
    bits: AtomicU8,
}

impl EdgeLatch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    /// Mark `line` as pending. Safe to call from interrupt context.
    pub fn raise(&self, line: EdgeLine) {
        self.bits
            .fetch_or(EnumSet::only(line).as_u8(), Ordering::AcqRel);
    }
}

impl EdgeInput for &EdgeLatch {
    fn pending(&self) -> EnumSet<EdgeLine> {
        EnumSet::from_u8_truncated(self.bits.load(Ordering::Acquire))
    }

    fn acknowledge(&mut self, line: EdgeLine) {
        self.bits
            .fetch_and(!EnumSet::only(line).as_u8(), Ordering::AcqRel);
    }
}
