use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::delay::{FreeRtos, TickType};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::prelude::*;
use esp_idf_hal::task::notification::Notification;
use log::{info, warn};
use shiftdash_core::{Controller, RelayBank, Shared};

mod board;
mod watchdog;

use crate::board::{RelayPort, SegmentPort, SpiStrip};
use crate::watchdog::WatchdogHandle;

/// Longest the control loop sleeps without a tach or shift edge.
const IDLE_WAIT: Duration = Duration::from_millis(100);

const STRIP_CLOCK_GPIO: i32 = 18;
const STRIP_DATA_GPIO: i32 = 23;

fn main() -> Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting shiftdash firmware...");

    let config = board::config();
    config.validate()?;

    let level = config.log_level.as_level_filter();
    if let Err(e) = esp_idf_svc::log::set_target_level("*", level) {
        warn!("Failed to set log level: {e}");
    } else {
        info!("Log level set to {:?}", config.log_level);
    }

    let peripherals = Peripherals::take()?;

    // Outputs first, so the relays are released before any input is armed
    let (relay_port, _relay_pins) = RelayPort::new()?;
    let relays = RelayBank::new(relay_port);
    let segments = SegmentPort::new()?;

    // SAFETY: fixed board wiring, nothing else uses these pins
    let (sclk, sdo) = unsafe {
        (
            AnyIOPin::new(STRIP_CLOCK_GPIO),
            AnyIOPin::new(STRIP_DATA_GPIO),
        )
    };
    let strip = SpiStrip::new(peripherals.spi2, sclk, sdo)?;

    let mut flash_timer = board::flash_timer(peripherals.timer00)?;
    let shared = Arc::new(Shared::new(&config, board::flash_timer_hz(&flash_timer)));

    let mut controller = Controller::new(&config, Arc::clone(&shared), strip, segments)?;
    controller.start();

    let notification = Notification::new();
    let _tach_pin = board::tach_input(&shared, notification.notifier())?;
    let _shift_pins = board::shift_inputs(&shared, &relays, &notification.notifier())?;
    board::start_flash(&mut flash_timer, &shared)?;

    let watchdog = WatchdogHandle::register(c"control_loop")?;
    let idle_ticks = TickType::from(IDLE_WAIT).ticks();
    info!("Control loop running");

    loop {
        watchdog.feed();
        if controller.poll() {
            // Let the idle task run; at high RPM a new sample is always waiting
            FreeRtos::delay_ms(1);
        } else {
            // Returns early when an interrupt callback notifies
            notification.wait(idle_ticks);
        }
    }
}
