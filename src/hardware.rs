//! Hardware abstraction and peripheral initialization.
//!
//! This module defines the pin mappings and peripheral initialization
//! for the watering controller board.
//!
//! # Pin Assignments
//!
//! ## Flow Sensor
//! - **PA0**: FLOW - Hall-effect sensor pulse output (EXTI0, pull-up)
//!
//! ## Keys (active-low, pull-up)
//! - **PA1**: KEY_MANUAL - Start/stop manual watering (EXTI1)
//! - **PA4**: KEY_AUTO - Enable/disable the schedule (EXTI4)
//! - **PA5**: KEY_MODE - Select schedule field (EXTI5)
//! - **PA6**: KEY_UP - Increment schedule field (EXTI6)
//! - **PA7**: KEY_DOWN - Decrement schedule field (EXTI7)
//!
//! ## Valve
//! - **PB0**: VALVE - Relay driver, active-high
//!
//! ## EEPROM (AT24C02 on I2C1)
//! - **PB6**: SCL
//! - **PB7**: SDA
//!
//! ## Serial (USART2, 9600 8N1)
//! - **PA9**: TX
//! - **PA10**: RX
//!
//! ## Display (two chained 74HC595: segments, then digit select)
//! - **PB5**: SER - Serial data
//! - **PB3**: SRCLK - Shift clock
//! - **PB4**: RCLK - Latch clock
//! - **PA8**: OE_N - Active-low output enable
//!
//! ## Debug (SWD)
//! - **PA13**: SWDIO
//! - **PA14**: SWCLK

use embassy_stm32::{
    bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    i2c::{self, I2c},
    mode::Blocking,
    peripherals,
    usart::{self, BufferedUart},
};
use embassy_time::Delay;
use static_cell::StaticCell;

use watering::app::Key;
use watering::eeprom::At24c02;
use watering::valve::{ActiveLevel, Valve};

use crate::panel::ShiftDisplay;

bind_interrupts!(struct Irqs {
    USART2 => usart::BufferedInterruptHandler<peripherals::USART2>;
});

/// Serial link baud rate.
const BAUD_RATE: u32 = 9600;

/// Serial ring buffer sizes in bytes.
const UART_TX_BUF: usize = 256;
const UART_RX_BUF: usize = 64;

static TX_BUF: StaticCell<[u8; UART_TX_BUF]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; UART_RX_BUF]> = StaticCell::new();

pub type Eeprom = At24c02<I2c<'static, Blocking>, Delay>;

/// Top-level peripheral container for the watering controller.
///
/// Owns all hardware handles and provides initialization
/// from STM32 peripheral singleton.
pub struct Peripherals {
    /// Flow sensor pulse input
    pub flow: ExtiInput<'static>,
    /// Front-panel keys with the event each one produces
    pub keys: [(ExtiInput<'static>, Key); 5],
    /// Relay-driven valve, closed
    pub valve: Valve<Output<'static>>,
    /// Non-volatile store
    pub eeprom: Eeprom,
    /// Serial link to the host
    pub uart: BufferedUart<'static>,
    /// Seven-segment display shift registers
    pub display: ShiftDisplay,
}

impl Peripherals {
    /// Initializes all peripherals from STM32 peripheral singleton.
    ///
    /// # Initial GPIO States
    ///
    /// - PB0 (VALVE): Low (valve closed)
    /// - PA8 (OE_N): High (display blank until the first frame)
    /// - PB3/PB4/PB5: Low
    ///
    /// # Arguments
    ///
    /// * `p` - STM32 peripheral singleton from embassy_stm32::init()
    ///
    /// # Returns
    ///
    /// Initialized Peripherals struct ready for use
    pub fn new(p: embassy_stm32::Peripherals) -> Self {
        let Ok(valve) = Valve::new(Output::new(p.PB0, Level::Low, Speed::Low), ActiveLevel::High);

        let i2c = I2c::new_blocking(p.I2C1, p.PB6, p.PB7, i2c::Config::default());

        let mut uart_config = usart::Config::default();
        uart_config.baudrate = BAUD_RATE;
        let uart = BufferedUart::new(
            p.USART2,
            p.PA10,
            p.PA9,
            TX_BUF.init([0; UART_TX_BUF]),
            RX_BUF.init([0; UART_RX_BUF]),
            Irqs,
            uart_config,
        )
        .unwrap();

        Self {
            flow: ExtiInput::new(p.PA0, p.EXTI0, Pull::Up),
            keys: [
                (ExtiInput::new(p.PA1, p.EXTI1, Pull::Up), Key::Manual),
                (ExtiInput::new(p.PA4, p.EXTI4, Pull::Up), Key::Auto),
                (ExtiInput::new(p.PA5, p.EXTI5, Pull::Up), Key::Mode),
                (ExtiInput::new(p.PA6, p.EXTI6, Pull::Up), Key::Up),
                (ExtiInput::new(p.PA7, p.EXTI7, Pull::Up), Key::Down),
            ],
            valve,
            eeprom: At24c02::new(i2c, Delay),
            uart,
            display: ShiftDisplay::new(
                Output::new(p.PB5, Level::Low, Speed::Low),
                Output::new(p.PB3, Level::Low, Speed::Low),
                Output::new(p.PB4, Level::Low, Speed::Low),
                Output::new(p.PA8, Level::High, Speed::Low),
            ),
        }
    }
}
