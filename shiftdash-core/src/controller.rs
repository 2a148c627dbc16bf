//! Main control loop.
//!
//! Interrupt handlers only touch [`Shared`]: they record a sample, toggle
//! the flash phase, or move the relays, and raise a flag. All rendering and
//! display work happens in [`Controller::poll`], which the firmware calls in
//! a loop and which handles at most one tach sample and one gear signal per
//! call.

use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, StripError};
use crate::flash::FlashScheduler;
use crate::gear::{GearDisplay, GearIndex};
use crate::hal::{CompareTimer, EdgeLatch, EdgeLine, ParallelOut, SerialOut, TimerCapture};
use crate::interlock::{GearSignal, RelayBank, RelayState, ShiftInterlock};
use crate::sk9822::Sk9822;
use crate::tach::{FrequencySampler, RpmConverter};
use crate::zone::{LedZoneTable, ShiftZone, StripImage};

/// State written from interrupt context and read by the main loop.
///
/// Every field has exactly one writer on each side of the handoff; nothing
/// here takes a lock.
#[derive(Debug)]
pub struct Shared {
    pub sampler: FrequencySampler,
    pub flash: FlashScheduler,
    pub interlock: ShiftInterlock,
    pub edges: EdgeLatch,
}

impl Shared {
    /// `flash_timer_hz` is the count rate of the timer driving the flash.
    #[must_use]
    pub fn new(config: &Config, flash_timer_hz: u32) -> Self {
        Self {
            sampler: FrequencySampler::new(),
            flash: FlashScheduler::from_millis(config.flash.half_period_ms, flash_timer_hz),
            interlock: ShiftInterlock::new(),
            edges: EdgeLatch::new(),
        }
    }

    /// Tach rising-edge interrupt.
    pub fn on_tach_edge<T: TimerCapture>(&self, counter: &mut T) {
        self.sampler.on_edge(counter);
    }

    /// Flash compare-match interrupt.
    pub fn on_flash_compare<T: CompareTimer>(&self, timer: &mut T) {
        self.flash.on_compare(timer);
    }

    /// Paddle or hall-sensor edge interrupt.
    ///
    /// Latches `line` and then services every line pending at that point,
    /// including ones raised by callbacks that have not run yet.
    pub fn on_shift_edge<P: ParallelOut>(&self, line: EdgeLine, relays: &mut RelayBank<P>) {
        self.edges.raise(line);
        let mut input = &self.edges;
        self.interlock.on_edges(&mut input, relays);
    }
}

/// Main-loop owner of the strip, the gear display and the displayed gear.
pub struct Controller<S, G> {
    shared: Arc<Shared>,
    converter: RpmConverter,
    zone: ShiftZone,
    table: LedZoneTable,
    strip: Sk9822<S>,
    display: GearDisplay<G>,
    gear: GearIndex,
    rpm: u32,
    image: Option<StripImage>,
    strip_faults: u32,
    ignored_seen: u32,
}

impl<S: SerialOut, G: ParallelOut> Controller<S, G> {
    /// Validate `config` and take ownership of the output peripherals.
    ///
    /// Nothing is written to the strip until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(config: &Config, shared: Arc<Shared>, serial: S, gear_port: G) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            shared,
            converter: RpmConverter::from_config(&config.tach),
            zone: ShiftZone::from_config(&config.strip),
            table: LedZoneTable::from_config(&config.strip),
            strip: Sk9822::new(serial, config.strip.brightness, config.strip.tx_busy_limit),
            display: GearDisplay::new(gear_port),
            gear: GearIndex::FIRST,
            rpm: 0,
            image: None,
            strip_faults: 0,
            ignored_seen: 0,
        })
    }

    /// Boot state: first gear shown and every LED dark.
    pub fn start(&mut self) {
        self.display.show(self.gear);
        let leds = self.zone.leds();
        if let Err(e) = self.strip.clear(leds) {
            self.strip_fault(e);
        }
        info!(
            "Controller started: {leds} LEDs, shift zone from {} RPM, gear {}",
            self.zone.threshold_rpm(),
            self.gear
        );
    }

    /// One main-loop iteration. Returns whether there was anything to do.
    pub fn poll(&mut self) -> bool {
        let mut handled = false;

        if let Some(sample) = self.shared.sampler.take() {
            let rpm = self.converter.rpm(sample);
            let image = self.zone.image(rpm, self.shared.flash.phase());
            trace!("{sample:?} -> {rpm} RPM -> {image:?}");
            if self.image != Some(image) {
                debug!("Strip image now {image:?} at {rpm} RPM");
            }
            self.rpm = rpm;
            self.image = Some(image);
            if let Err(e) = self.zone.draw(&mut self.strip, image, &self.table) {
                self.strip_fault(e);
            }
            handled = true;
        }

        if let Some(signal) = self.shared.interlock.take_signal() {
            self.apply_signal(signal);
            handled = true;
        }

        let ignored = self.shared.interlock.ignored_edges();
        if ignored != self.ignored_seen {
            warn!(
                "Ignored {} shift edge(s) while relay was {:?}",
                ignored.wrapping_sub(self.ignored_seen),
                self.shared.interlock.state()
            );
            self.ignored_seen = ignored;
        }

        handled
    }

    fn apply_signal(&mut self, signal: GearSignal) {
        let moved = match signal {
            GearSignal::Advance => self.gear.advance(),
            GearSignal::Retreat => self.gear.retreat(),
        };
        if moved {
            info!("Shift confirmed: gear {}", self.gear);
        } else {
            debug!("{signal:?} confirmed at gear {}, display unchanged", self.gear);
        }
        self.display.show(self.gear);
    }

    fn strip_fault(&mut self, e: StripError) {
        self.strip_faults = self.strip_faults.saturating_add(1);
        warn!("LED strip fault #{}: {e}", self.strip_faults);
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    #[must_use]
    pub fn gear(&self) -> GearIndex {
        self.gear
    }

    /// Speed computed from the last sample, 0 before the first.
    #[must_use]
    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    /// Image drawn for the last sample.
    #[must_use]
    pub fn image(&self) -> Option<StripImage> {
        self.image
    }

    #[must_use]
    pub fn relay_state(&self) -> RelayState {
        self.shared.interlock.state()
    }

    /// Renders abandoned because of a strip fault.
    #[must_use]
    pub fn strip_faults(&self) -> u32 {
        self.strip_faults
    }

    #[must_use]
    pub fn zone(&self) -> &ShiftZone {
        &self.zone
    }

    pub fn strip(&self) -> &Sk9822<S> {
        &self.strip
    }

    pub fn display(&self) -> &GearDisplay<G> {
        &self.display
    }
}
