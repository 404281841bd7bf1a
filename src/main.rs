//! Firmware for a volume-metered garden watering controller.
//!
//! # Overview
//!
//! This firmware meters water through a hall-effect flow sensor and opens
//! a relay valve:
//! - once a day at a configured time, until a target volume is delivered
//! - on demand from the manual key, until the key is pressed again
//!
//! The lifetime total and the schedule survive power loss in an I2C
//! EEPROM. Time, date and schedule are set over a serial link.
//!
//! # Hardware
//!
//! - **MCU**: STM32L031G6U6 (Cortex-M0+)
//! - **Flow sensor**: hall-effect, 5 pulses per litre
//! - **Valve**: solenoid valve behind a relay driver
//! - **Storage**: AT24C02 256-byte EEPROM
//! - **Display**: 8-digit seven-segment, two 74HC595
//! - **Keys**: Auto, Mode, Up, Down, Manual
//!
//! # Task Layout
//!
//! Edge tasks only count pulses or forward debounced keys, and the serial
//! tasks only move bytes. All accounting, scheduling and persistence runs
//! in the main loop, once per second or when a key or command arrives.
//!
//! # Module Organization
//!
//! - [`hardware`] - Pin mappings and peripheral initialization
//! - [`sensor`] - Flow pulse counting
//! - [`panel`] - Display refresh and key debouncing
//! - [`serial`] - Command input and reply output

#![no_std]
#![no_main]

mod hardware;
mod panel;
mod sensor;
mod serial;

use embassy_executor::Spawner;
use embassy_futures::select::{Either3, select3};
use embassy_stm32::{
    Config,
    rcc::{LsConfig, mux::ClockMux},
};
use embassy_time::{Duration, Ticker};
use {defmt_rtt as _, panic_probe as _};

use watering::app::App;
use watering::clock::WallClock;
use watering::command::render_line;
use watering::controller::WateringController;
use watering::display::Display;
use watering::flow::{FlowConfig, TICK_SECS};
use watering::record::WateringRecord;
use watering::storage::NvStore;

use hardware::Peripherals;
use panel::{KEYS, display_task, key_task};
use sensor::{PULSES, pulse_task};
use serial::{LINES, send, serial_rx_task, serial_tx_task};

/// Creates the clock configuration for STM32L031.
///
/// # Clock Settings
///
/// - **HSI16**: 16 MHz internal oscillator, accurate enough for 9600 baud
/// - **System clock**: HSI16 (no PLL)
/// - **Voltage scale**: Range 1
///
/// The controller is mains powered, so clock accuracy for the serial link
/// and the wall clock matters more than active current.
///
/// # Returns
///
/// Configured RCC settings for embassy-stm32 initialization
fn create_clock_config() -> embassy_stm32::rcc::Config {
    embassy_stm32::rcc::Config {
        msi: None,
        hsi: true,
        hse: None,
        pll: None,
        sys: embassy_stm32::rcc::Sysclk::HSI,
        ahb_pre: embassy_stm32::rcc::AHBPrescaler::DIV1,
        apb1_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        apb2_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        ls: LsConfig::default(),
        voltage_scale: embassy_stm32::rcc::VoltageScale::RANGE1,
        mux: ClockMux::default(),
    }
}

fn emit_record(record: Option<WateringRecord>) {
    if let Some(record) = record {
        send(render_line(&record));
    }
}

/// Main entry point for the watering controller firmware.
///
/// # Initialization Sequence
///
/// 1. Configure clocks (HSI16)
/// 2. Initialize STM32 peripherals, valve driven closed
/// 3. Restore total and schedule from the EEPROM
/// 4. Spawn sensor, key, display and serial tasks
/// 5. Enter the main loop
///
/// # Main Loop
///
/// Waits for the first of:
/// - the 1 s ticker: clock, flow, scheduler, persistence, display
/// - a command line from the serial link
/// - a debounced key press
///
/// After each event the display frame is republished.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = Config::default();
    config.rcc = create_clock_config();

    let p = embassy_stm32::init(config);

    #[cfg(feature = "debug-mode")]
    defmt::info!("Watering controller firmware starting...");

    let peripherals = Peripherals::new(p);

    #[cfg(feature = "debug-mode")]
    defmt::info!("Restoring state from EEPROM...");

    let clock = WallClock::default();
    let controller = WateringController::init(
        peripherals.valve,
        &PULSES,
        FlowConfig::default(),
        NvStore::new(peripherals.eeprom),
        // No RTC: boot time is midnight, so the boot re-arm never applies.
        clock.now().time,
    );
    let mut app = App::new(clock, controller, Display::default());
    panel::show(app.frame());

    #[cfg(feature = "debug-mode")]
    defmt::info!("Spawning tasks...");

    let (tx, rx) = peripherals.uart.split();
    spawner.spawn(pulse_task(peripherals.flow)).unwrap();
    spawner.spawn(display_task(peripherals.display)).unwrap();
    spawner.spawn(serial_rx_task(rx)).unwrap();
    spawner.spawn(serial_tx_task(tx)).unwrap();
    for (input, key) in peripherals.keys {
        spawner.spawn(key_task(input, key)).unwrap();
    }

    #[cfg(feature = "debug-mode")]
    defmt::info!("Entering main loop...");

    let mut ticker = Ticker::every(Duration::from_secs(TICK_SECS as u64));
    loop {
        match select3(ticker.next(), LINES.receive(), KEYS.receive()).await {
            Either3::First(()) => emit_record(app.tick()),
            Either3::Second(line) => {
                let response = app.handle_line(line);
                send(render_line(&response.reply));
                emit_record(response.record);
            }
            Either3::Third(key) => match app.handle_key(key) {
                Ok(record) => emit_record(record),
                Err(_e) => {
                    #[cfg(feature = "debug-mode")]
                    defmt::warn!("Key {} refused: {}", key, _e);
                }
            },
        }
        panel::show(app.frame());
    }
}
