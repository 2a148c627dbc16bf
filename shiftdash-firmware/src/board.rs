//! ESP32 bindings for the control core's capability traits.
//!
//! ## Wiring
//!
//! ```text
//! GPIO 18  SK9822 clock (SPI, mode 3)     GPIO 16  up-shift relay
//! GPIO 23  SK9822 data                    GPIO 17  down-shift relay
//! GPIO 34  tach pulse (rising edge)       GPIO 26  up paddle     (to GND)
//!                                         GPIO 27  down paddle   (to GND)
//! GPIO 4, 5, 13, 14, 19, 21, 22, 25       GPIO 32  hall: upshift done
//!          7-segment, bit 0 first         GPIO 33  hall: downshift done
//! ```
//!
//! The tach line is timed against `esp_timer` (1 MHz, ISR-safe). The flash
//! timer is timer group 0, timer 0, counting at 1 MHz with its alarm moved
//! forward one period from inside its own interrupt.

use core::num::NonZero;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use esp_idf_hal::gpio::{AnyIOPin, Input, InterruptType, Level, Output, PinDriver, Pull};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::spi::{config, SpiAnyPins, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::task::notification::Notifier;
use esp_idf_hal::timer::{config::Config as TimerConfig, Timer, TimerDriver};
use esp_idf_hal::units::FromValueType;
use esp_idf_svc::sys::{
    esp_timer_get_time, gpio_intr_enable, gpio_set_level, timer_group_enable_alarm_in_isr,
    timer_group_set_alarm_value_in_isr, timer_group_t_TIMER_GROUP_0, timer_idx_t_TIMER_0,
    EspError,
};
use log::{debug, info};
use shiftdash_core::config::Config;
use shiftdash_core::hal::{CompareTimer, EdgeLine, ParallelOut, SerialOut, TimerCapture};
use shiftdash_core::{RelayBank, Shared};

pub const TACH_GPIO: i32 = 34;
pub const UP_RELAY_GPIO: i32 = 16;
pub const DOWN_RELAY_GPIO: i32 = 17;
pub const SEGMENT_GPIOS: [i32; 8] = [4, 5, 13, 14, 19, 21, 22, 25];

/// Paddle and hall-sensor inputs, all active low.
pub const SHIFT_INPUTS: [(EdgeLine, i32); 4] = [
    (EdgeLine::UpPaddle, 26),
    (EdgeLine::DownPaddle, 27),
    (EdgeLine::UpConfirm, 32),
    (EdgeLine::DownConfirm, 33),
];

/// `esp_timer` counts microseconds.
const TACH_CLOCK_HZ: u32 = 1_000_000;

const STRIP_BAUDRATE_MHZ: u32 = 4;

/// Built-in configuration, with the tach counter moved to this board's clock.
pub fn config() -> Config {
    let mut config = Config::default();
    config.tach.source_clock_hz = TACH_CLOCK_HZ;
    config.tach.prescaler = 1;
    config
}

fn wake(notifier: &Notifier) {
    // SAFETY: notifying a task is allowed from interrupt context
    unsafe {
        notifier.notify(NonZero::<u32>::MIN);
    }
}

/// SK9822 strip on SPI. Every write blocks until the byte is out, so the
/// transmitter is never seen busy.
pub struct SpiStrip<'d> {
    spi: SpiDeviceDriver<'d, SpiDriver<'d>>,
}

impl<'d> SpiStrip<'d> {
    pub fn new<SPI: SpiAnyPins>(
        spi: impl Peripheral<P = SPI> + 'd,
        sclk: AnyIOPin,
        sdo: AnyIOPin,
    ) -> Result<Self, EspError> {
        let driver = SpiDriver::new(spi, sclk, sdo, None::<AnyIOPin>, &SpiDriverConfig::new())?;
        let spi_config = config::Config::new()
            .baudrate(STRIP_BAUDRATE_MHZ.MHz().into())
            .data_mode(config::MODE_3);
        let spi = SpiDeviceDriver::new(driver, None::<AnyIOPin>, &spi_config)?;
        info!("SK9822 strip on SPI at {STRIP_BAUDRATE_MHZ} MHz");
        Ok(Self { spi })
    }
}

impl SerialOut for SpiStrip<'_> {
    type Error = EspError;

    fn tx_busy(&mut self) -> bool {
        false
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.spi.write(&[byte])
    }
}

/// Tach interval timer: microseconds since the previous edge.
#[derive(Debug, Default)]
pub struct EspTimerCapture {
    last_us: i64,
}

impl TimerCapture for EspTimerCapture {
    fn capture(&mut self) -> u32 {
        // SAFETY: esp_timer_get_time is ISR-safe
        let now = unsafe { esp_timer_get_time() };
        u32::try_from(now - self.last_us).unwrap_or(u32::MAX)
    }

    fn reset(&mut self) {
        // SAFETY: as above
        self.last_us = unsafe { esp_timer_get_time() };
    }
}

/// Alarm of timer group 0 timer 0, seen as a 32-bit wrapping compare.
#[derive(Debug, Default)]
pub struct FlashCompare {
    compare: u32,
    epoch: u64,
}

impl CompareTimer for FlashCompare {
    fn compare(&self) -> u32 {
        self.compare
    }

    fn set_compare(&mut self, value: u32) {
        if value < self.compare {
            self.epoch += 1 << 32;
        }
        self.compare = value;
        let alarm = self.epoch + u64::from(value);
        // SAFETY: only this timer's interrupt (or setup before it is enabled)
        // touches the alarm registers
        unsafe {
            timer_group_set_alarm_value_in_isr(timer_group_t_TIMER_GROUP_0, timer_idx_t_TIMER_0, alarm);
            timer_group_enable_alarm_in_isr(timer_group_t_TIMER_GROUP_0, timer_idx_t_TIMER_0);
        }
    }
}

/// Relay outputs, driven straight from the shift-edge interrupts.
///
/// Copies share one output latch, so every edge callback can hold its own
/// [`RelayBank`].
#[derive(Debug, Clone, Copy)]
pub struct RelayPort {
    latch: &'static AtomicU8,
}

static RELAY_LATCH: AtomicU8 = AtomicU8::new(0);

impl RelayPort {
    /// Configure both relay pins as outputs, released. The returned drivers
    /// must be kept alive.
    pub fn new() -> Result<(Self, Vec<PinDriver<'static, AnyIOPin, Output>>), EspError> {
        let mut drivers = Vec::with_capacity(2);
        for gpio in [UP_RELAY_GPIO, DOWN_RELAY_GPIO] {
            // SAFETY: fixed board wiring, nothing else uses these pins
            let mut pin = PinDriver::output(unsafe { AnyIOPin::new(gpio) })?;
            pin.set_low()?;
            drivers.push(pin);
        }
        RELAY_LATCH.store(0, Ordering::Release);
        Ok((Self { latch: &RELAY_LATCH }, drivers))
    }
}

impl ParallelOut for RelayPort {
    fn read(&self) -> u8 {
        self.latch.load(Ordering::Acquire)
    }

    fn write(&mut self, value: u8) {
        self.latch.store(value, Ordering::Release);
        let up = u32::from(value & shiftdash_core::interlock::UP_RELAY != 0);
        let down = u32::from(value & shiftdash_core::interlock::DOWN_RELAY != 0);
        // SAFETY: gpio_set_level is ISR-safe and the pins are configured as
        // outputs by `RelayPort::new`
        unsafe {
            gpio_set_level(UP_RELAY_GPIO, up);
            gpio_set_level(DOWN_RELAY_GPIO, down);
        }
    }
}

/// 7-segment digit on eight GPIOs, bit 0 on the first pin.
pub struct SegmentPort {
    pins: Vec<PinDriver<'static, AnyIOPin, Output>>,
    value: u8,
}

impl SegmentPort {
    pub fn new() -> Result<Self, EspError> {
        let pins = SEGMENT_GPIOS
            .into_iter()
            // SAFETY: fixed board wiring, nothing else uses these pins
            .map(|gpio| PinDriver::output(unsafe { AnyIOPin::new(gpio) }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pins, value: 0 })
    }
}

impl ParallelOut for SegmentPort {
    fn read(&self) -> u8 {
        self.value
    }

    fn write(&mut self, value: u8) {
        self.value = value;
        for (bit, pin) in self.pins.iter_mut().enumerate() {
            let level = Level::from(value & (1 << bit) != 0);
            if let Err(e) = pin.set_level(level) {
                debug!("Segment {bit}: {e:?}");
            }
        }
    }
}

/// Arm the tach input. The returned driver must be kept alive.
pub fn tach_input(
    shared: &Arc<Shared>,
    notifier: Arc<Notifier>,
) -> Result<PinDriver<'static, AnyIOPin, Input>, EspError> {
    // SAFETY: fixed board wiring
    let mut pin = PinDriver::input(unsafe { AnyIOPin::new(TACH_GPIO) })?;
    pin.set_interrupt_type(InterruptType::PosEdge)?;

    let shared = Arc::clone(shared);
    let mut counter = EspTimerCapture::default();
    counter.reset();
    // SAFETY: the callback only touches atomics, esp_timer and the GPIO
    // interrupt enable, all of which are ISR-safe
    unsafe {
        pin.subscribe(move || {
            shared.on_tach_edge(&mut counter);
            gpio_intr_enable(TACH_GPIO);
            wake(&notifier);
        })?;
    }
    pin.enable_interrupt()?;
    info!("Tach input armed on GPIO {TACH_GPIO}");
    Ok(pin)
}

/// Arm the paddle and hall inputs. The returned drivers must be kept alive.
pub fn shift_inputs(
    shared: &Arc<Shared>,
    relays: &RelayBank<RelayPort>,
    notifier: &Arc<Notifier>,
) -> Result<Vec<PinDriver<'static, AnyIOPin, Input>>, EspError> {
    let mut drivers = Vec::with_capacity(SHIFT_INPUTS.len());
    for (line, gpio) in SHIFT_INPUTS {
        // SAFETY: fixed board wiring
        let mut pin = PinDriver::input(unsafe { AnyIOPin::new(gpio) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_interrupt_type(InterruptType::NegEdge)?;

        let shared = Arc::clone(shared);
        let notifier = Arc::clone(notifier);
        let mut relays = relays.clone();
        // SAFETY: the callback only touches atomics and ISR-safe GPIO calls
        unsafe {
            pin.subscribe(move || {
                shared.on_shift_edge(line, &mut relays);
                gpio_intr_enable(gpio);
                wake(&notifier);
            })?;
        }
        pin.enable_interrupt()?;
        debug!("{line:?} armed on GPIO {gpio}");
        drivers.push(pin);
    }
    Ok(drivers)
}

/// Take the flash timer, stopped, counting from zero.
pub fn flash_timer<TIMER: Timer>(
    timer: impl Peripheral<P = TIMER> + 'static,
) -> Result<TimerDriver<'static>, EspError> {
    let mut driver = TimerDriver::new(timer, &TimerConfig::new().auto_reload(false))?;
    driver.set_counter(0)?;
    Ok(driver)
}

/// Count rate of the flash timer.
pub fn flash_timer_hz(driver: &TimerDriver<'_>) -> u32 {
    u32::try_from(driver.tick_hz()).unwrap_or(u32::MAX)
}

/// Arm the first flash compare and start the timer.
pub fn start_flash(driver: &mut TimerDriver<'static>, shared: &Arc<Shared>) -> Result<(), EspError> {
    let mut compare = FlashCompare::default();
    shared.flash.start(&mut compare, 0);
    let period = shared.flash.period_ticks();

    let shared = Arc::clone(shared);
    // SAFETY: the callback only touches atomics and this timer's alarm
    unsafe {
        driver.subscribe(move || shared.on_flash_compare(&mut compare))?;
    }
    driver.enable_interrupt()?;
    driver.enable(true)?;
    info!("Flash timer running, {period} ticks per phase");
    Ok(())
}
