//! Simulated dashboard board.
//!
//! Wires a [`Controller`] to the mock peripherals and plays the part of the
//! interrupt controller: tach edges, flash compare matches and shift edges
//! are delivered to [`Shared`] exactly as the firmware's callbacks would.

use std::sync::Arc;

use shiftdash_core::config::Config;
use shiftdash_core::hal::{CompareTimer, EdgeLine};
use shiftdash_core::mock::{MockCompareTimer, MockCounter, MockPort, StripModel};
use shiftdash_core::tach::RpmConverter;
use shiftdash_core::{Controller, RelayBank, Shared, RGB8};

pub struct Bench {
    config: Config,
    controller: Controller<StripModel, MockPort>,
    shared: Arc<Shared>,
    converter: RpmConverter,
    tick_rate_hz: u32,
    counter: MockCounter,
    timer: MockCompareTimer,
    relays: RelayBank<MockPort>,
}

impl Bench {
    /// Boot a board running `config`. The flash timer shares the tach clock.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let tick_rate_hz = config.tach.tick_rate_hz();
        let shared = Arc::new(Shared::new(config, tick_rate_hz));
        let mut controller = Controller::new(
            config,
            Arc::clone(&shared),
            StripModel::new(config.strip.total_leds()),
            MockPort::default(),
        )?;
        let relays = RelayBank::new(MockPort::default());
        controller.start();

        let mut timer = MockCompareTimer::default();
        shared.flash.start(&mut timer, 0);

        Ok(Self {
            config: config.clone(),
            controller,
            shared,
            converter: RpmConverter::from_config(&config.tach),
            tick_rate_hz,
            counter: MockCounter::default(),
            timer,
            relays,
        })
    }

    pub fn controller(&self) -> &Controller<StripModel, MockPort> {
        &self.controller
    }

    /// Let `ticks` of counter time pass, firing any flash compares on the way.
    fn elapse(&mut self, ticks: u32) {
        self.counter.advance(ticks);
        let mut remaining = ticks;
        loop {
            let until = self.timer.compare().wrapping_sub(self.timer.now());
            if until > remaining {
                break;
            }
            remaining -= until;
            let compare = self.timer.compare();
            self.timer.advance_to(compare);
            self.shared.on_flash_compare(&mut self.timer);
        }
        let end = self.timer.now().wrapping_add(remaining);
        self.timer.advance_to(end);
    }

    /// Run the engine at `rpm` for `dwell_ms`, polling after every tach pulse.
    pub fn run_at(&mut self, rpm: u32, dwell_ms: u32) {
        let dwell = u32::try_from(u64::from(dwell_ms) * u64::from(self.tick_rate_hz) / 1_000)
            .unwrap_or(u32::MAX);
        let period = self.converter.ticks_for_rpm(rpm).0;
        if period == 0 {
            // Engine stopped: no edges, the strip keeps its last image
            self.elapse(dwell);
            self.controller.poll();
            return;
        }

        let mut elapsed = 0;
        while elapsed < dwell {
            self.elapse(period);
            elapsed += period;
            self.shared.on_tach_edge(&mut self.counter);
            self.controller.poll();
        }
    }

    /// Deliver one paddle or hall edge, then let the main loop run.
    pub fn edge(&mut self, line: EdgeLine) {
        self.shared.on_shift_edge(line, &mut self.relays);
        self.controller.poll();
    }

    /// Strip as one character per LED: `G`/`Y`/`R` by band color, `.` when dark.
    pub fn strip_text(&self) -> String {
        let strip = &self.config.strip;
        self.controller
            .strip()
            .serial()
            .leds()
            .into_iter()
            .map(|led| match led {
                c if c == RGB8::default() => '.',
                c if c == strip.green => 'G',
                c if c == strip.yellow => 'Y',
                c if c == strip.red => 'R',
                _ => '*',
            })
            .collect()
    }

    pub fn status_line(&self) -> String {
        format!(
            "{:>6} RPM [{}] gear {} relays {:?} (port {:#04x})",
            self.controller.rpm(),
            self.strip_text(),
            self.controller.gear(),
            self.controller.relay_state(),
            self.relays.port().value(),
        )
    }
}
