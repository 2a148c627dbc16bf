//! Shift-zone flash timing.
//!
//! A compare timer fires every half-period and toggles [`FlashScheduler::phase`].
//! Each firing re-arms by advancing the previous compare target by one
//! period, not by "now + period", so interrupt latency never accumulates
//! into drift.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal::CompareTimer;

#[derive(Debug)]
pub struct FlashScheduler {
    period_ticks: u32,
    phase: AtomicBool,
}

impl FlashScheduler {
    #[must_use]
    pub const fn new(period_ticks: u32) -> Self {
        Self {
            period_ticks,
            phase: AtomicBool::new(false),
        }
    }

    /// Scheduler toggling every `half_period_ms` on a timer counting at `timer_hz`.
    #[must_use]
    pub fn from_millis(half_period_ms: u32, timer_hz: u32) -> Self {
        let ticks = u64::from(half_period_ms) * u64::from(timer_hz) / 1_000;
        Self::new(u32::try_from(ticks).unwrap_or(u32::MAX).max(1))
    }

    #[must_use]
    pub const fn period_ticks(&self) -> u32 {
        self.period_ticks
    }

    /// Arm the first compare one period after `now`.
    pub fn start<T: CompareTimer>(&self, timer: &mut T, now: u32) {
        timer.set_compare(now.wrapping_add(self.period_ticks));
    }

    /// Handle a compare match. Interrupt context.
    pub fn on_compare<T: CompareTimer>(&self, timer: &mut T) {
        self.phase.fetch_xor(true, Ordering::AcqRel);
        let next = timer.compare().wrapping_add(self.period_ticks);
        timer.set_compare(next);
    }

    /// Current flash phase: `true` shows the all-red frame.
    #[must_use]
    pub fn phase(&self) -> bool {
        self.phase.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCompareTimer;

    #[test]
    fn test_toggles_on_each_compare() {
        let flash = FlashScheduler::new(4_000);
        let mut timer = MockCompareTimer::default();
        flash.start(&mut timer, 0);

        assert!(!flash.phase());
        flash.on_compare(&mut timer);
        assert!(flash.phase());
        flash.on_compare(&mut timer);
        assert!(!flash.phase());
    }

    #[test]
    fn test_rearm_does_not_drift_with_latency() {
        let flash = FlashScheduler::new(4_000);
        let mut timer = MockCompareTimer::default();
        flash.start(&mut timer, 100);

        // Service each match late by a varying amount
        for (i, latency) in [3, 250, 17, 999, 0].into_iter().enumerate() {
            let target = timer.compare();
            timer.advance_to(target + latency);
            flash.on_compare(&mut timer);

            let fired = u32::try_from(i).unwrap() + 1;
            assert_eq!(timer.compare(), 100 + 4_000 * (fired + 1));
        }
    }

    #[test]
    fn test_compare_wraps() {
        let flash = FlashScheduler::new(4_000);
        let mut timer = MockCompareTimer::default();
        flash.start(&mut timer, u32::MAX - 1_000);
        assert_eq!(timer.compare(), 2_999);
    }

    #[test]
    fn test_period_from_millis() {
        assert_eq!(FlashScheduler::from_millis(33, 1_000_000).period_ticks(), 33_000);
        assert_eq!(FlashScheduler::from_millis(33, 1_000).period_ticks(), 33);
        assert_eq!(FlashScheduler::from_millis(1, 10).period_ticks(), 1);
    }
}
