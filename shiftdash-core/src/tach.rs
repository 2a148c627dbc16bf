//! Tachometer frequency sampling and RPM conversion.
//!
//! The capture counter runs freely at a known tick rate. Every rising edge
//! on the tach line reads the ticks elapsed since the previous edge and
//! restarts the counter, so each [`TachSample`] is exactly one
//! pulse-to-pulse interval. There is no smoothing and no queue: a sample the
//! main loop has not picked up yet is overwritten by the next edge.
//!
//! With the engine stopped no edges arrive and the last sample simply goes
//! stale. That is not reported to the consumer.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use num_integer::Integer;

use crate::config::TachConfig;
use crate::hal::TimerCapture;

/// Raw counter ticks between two consecutive tach pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TachSample(pub u32);

/// Interrupt-side owner of the latest [`TachSample`].
#[derive(Debug, Default)]
pub struct FrequencySampler {
    ticks: AtomicU32,
    ready: AtomicBool,
}

impl FrequencySampler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Handle a rising tach edge. Interrupt context.
    pub fn on_edge<T: TimerCapture>(&self, counter: &mut T) {
        let ticks = counter.capture();
        counter.reset();
        self.ticks.store(ticks, Ordering::Release);
        self.ready.store(true, Ordering::Release);
    }

    /// Take the latest sample if one arrived since the last call.
    ///
    /// Main-loop context. Clears the "sample ready" signal.
    pub fn take(&self) -> Option<TachSample> {
        if self.ready.swap(false, Ordering::AcqRel) {
            Some(TachSample(self.ticks.load(Ordering::Acquire)))
        } else {
            None
        }
    }
}

/// Converts capture ticks to engine speed.
///
/// `rpm = (F * 60) / (ticks * P)`, rounded to the nearest RPM, where `F` is
/// the counter tick rate and `P` the tach pulses per revolution. Must be
/// rebuilt whenever the clock or prescaler changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpmConverter {
    tick_rate_hz: u32,
    pulses_per_rev: u32,
}

impl RpmConverter {
    #[must_use]
    pub const fn new(tick_rate_hz: u32, pulses_per_rev: u32) -> Self {
        Self {
            tick_rate_hz,
            pulses_per_rev,
        }
    }

    #[must_use]
    pub const fn from_config(tach: &TachConfig) -> Self {
        Self::new(tach.tick_rate_hz(), tach.pulses_per_rev)
    }

    /// Engine speed for one sample. Zero ticks means no signal yet: 0 RPM.
    #[must_use]
    pub fn rpm(&self, sample: TachSample) -> u32 {
        let ticks_per_rev = u64::from(sample.0) * u64::from(self.pulses_per_rev);
        if ticks_per_rev == 0 {
            return 0;
        }
        u32::try_from(self.ticks_per_minute_over(ticks_per_rev)).unwrap_or(u32::MAX)
    }

    /// Tick count that reads back as `rpm`. Inverse of [`rpm`](Self::rpm),
    /// used to synthesize tach signals.
    #[must_use]
    pub fn ticks_for_rpm(&self, rpm: u32) -> TachSample {
        let per_minute = u64::from(rpm) * u64::from(self.pulses_per_rev);
        if per_minute == 0 {
            return TachSample(0);
        }
        let ticks = self.ticks_per_minute_over(per_minute);
        TachSample(u32::try_from(ticks).unwrap_or(u32::MAX))
    }

    /// `F * 60 / divisor`, rounded half up. `divisor` must be non-zero.
    fn ticks_per_minute_over(&self, divisor: u64) -> u64 {
        let ticks_per_minute = u64::from(self.tick_rate_hz) * 60;
        let (quotient, remainder) = ticks_per_minute.div_rem(&divisor);
        if remainder >= divisor - remainder {
            quotient + 1
        } else {
            quotient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCounter;

    fn converter() -> RpmConverter {
        RpmConverter::from_config(&TachConfig::default())
    }

    #[test]
    fn test_zero_ticks_is_zero_rpm() {
        assert_eq!(converter().rpm(TachSample(0)), 0);
    }

    #[test]
    fn test_known_speeds() {
        let conv = converter();
        // 750 kHz * 60 / (ticks * 8)
        assert_eq!(conv.rpm(TachSample(750)), 7_500);
        assert_eq!(conv.rpm(TachSample(5_625)), 1_000);
        // 45_000_000 / 7_504 = 5996.8 -> 5997
        assert_eq!(conv.rpm(TachSample(938)), 5_997);
        // A single tick is the fastest representable speed
        assert_eq!(conv.rpm(TachSample(1)), 5_625_000);
    }

    #[test]
    fn test_rounds_to_nearest() {
        let conv = converter();
        for ticks in 1..=20_000u32 {
            let exact = 45_000_000.0_f64 / (f64::from(ticks) * 8.0);
            let rpm = f64::from(conv.rpm(TachSample(ticks)));
            assert!(
                (rpm - exact).abs() <= 0.5,
                "ticks {ticks}: got {rpm}, exact {exact}"
            );
        }
    }

    #[test]
    fn test_rounds_half_up_at_extremes() {
        // 60 / 120 is exactly half an RPM
        assert_eq!(RpmConverter::new(1, 1).rpm(TachSample(120)), 1);
        assert_eq!(RpmConverter::new(1, 1).rpm(TachSample(121)), 0);

        let widest = RpmConverter::new(u32::MAX, u32::MAX);
        assert_eq!(widest.rpm(TachSample(u32::MAX)), 0);
        assert_eq!(widest.ticks_for_rpm(u32::MAX), TachSample(0));
    }

    #[test]
    fn test_ticks_for_rpm_reads_back() {
        let conv = converter();
        for rpm in [1_000, 3_000, 6_000, 9_000, 12_000] {
            let sample = conv.ticks_for_rpm(rpm);
            let back = conv.rpm(sample);
            assert!(back.abs_diff(rpm) <= rpm / 100, "{rpm} -> {sample:?} -> {back}");
        }
        assert_eq!(conv.ticks_for_rpm(0), TachSample(0));
    }

    #[test]
    fn test_sampler_keeps_latest_only() {
        let sampler = FrequencySampler::new();
        let mut counter = MockCounter::default();

        assert_eq!(sampler.take(), None);

        counter.advance(1_200);
        sampler.on_edge(&mut counter);
        counter.advance(900);
        sampler.on_edge(&mut counter);

        // Older unread value is lost, newest wins
        assert_eq!(sampler.take(), Some(TachSample(900)));
        assert_eq!(sampler.take(), None);
    }

    #[test]
    fn test_sampler_resets_counter() {
        let sampler = FrequencySampler::new();
        let mut counter = MockCounter::default();

        counter.advance(500);
        sampler.on_edge(&mut counter);
        assert_eq!(counter.capture(), 0);
    }
}
