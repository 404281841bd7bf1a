//! Front panel: multiplexed seven-segment display and keys.
//!
//! The display is eight common-cathode digits behind two chained 74HC595
//! shift registers. The first byte shifted out selects the segments, the
//! second selects the digit (active-low). Only one digit is lit at a time,
//! so the refresh task keeps cycling through the frame.

use core::cell::Cell;

use embassy_stm32::{exti::ExtiInput, gpio::Output};
use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    channel::Channel,
};
use embassy_time::Timer;

use watering::app::Key;
use watering::display::{FRAME_LEN, Frame, Glyph};

/// Time each digit stays lit, in milliseconds.
const DIGIT_HOLD_MS: u64 = 2;

/// Key must still read low after this long to count as a press.
const DEBOUNCE_MS: u64 = 20;

/// Segment patterns for 0-9 (bit 0 = segment a, bit 6 = segment g).
const DIGIT_SEGMENTS: [u8; 10] = [0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F];

const DASH_SEGMENTS: u8 = 0x40;

/// Frame the refresh task draws, updated by the main loop.
pub static FRAME: Mutex<CriticalSectionRawMutex, Cell<Frame>> =
    Mutex::new(Cell::new([Glyph::Blank; FRAME_LEN]));

/// Debounced key presses for the main loop.
pub static KEYS: Channel<CriticalSectionRawMutex, Key, 4> = Channel::new();

/// Publishes a new frame to the refresh task.
pub fn show(frame: Frame) {
    FRAME.lock(|f| f.set(frame));
}

fn segments(glyph: Glyph) -> u8 {
    match glyph {
        Glyph::Blank => 0x00,
        Glyph::Dash => DASH_SEGMENTS,
        Glyph::Digit(d) => DIGIT_SEGMENTS.get(d as usize).copied().unwrap_or(0x00),
        Glyph::Letter(c) => match c {
            b'C' => 0x39,
            b'F' => 0x71,
            b'S' => 0x6D,
            b'd' => 0x5E,
            b'h' => 0x74,
            b'n' => 0x54,
            b'r' => 0x50,
            _ => 0x00,
        },
    }
}

/// Bit-banged 74HC595 pair.
pub struct ShiftDisplay {
    /// Serial data
    ser: Output<'static>,
    /// Shift clock
    srclk: Output<'static>,
    /// Latch clock
    rclk: Output<'static>,
    /// Active-low output enable
    oe_n: Output<'static>,
}

impl ShiftDisplay {
    pub fn new(
        ser: Output<'static>,
        srclk: Output<'static>,
        rclk: Output<'static>,
        oe_n: Output<'static>,
    ) -> Self {
        Self {
            ser,
            srclk,
            rclk,
            oe_n,
        }
    }

    pub fn enable(&mut self) {
        self.oe_n.set_low();
    }

    /// Lights `position` (0 = leftmost) with `segs`.
    fn write_digit(&mut self, position: usize, segs: u8) {
        let select = !(1u8 << position);
        self.shift_byte(segs);
        self.shift_byte(select);
        self.rclk.set_high();
        self.rclk.set_low();
    }

    fn shift_byte(&mut self, byte: u8) {
        for bit in (0..8).rev() {
            if byte & (1 << bit) != 0 {
                self.ser.set_high();
            } else {
                self.ser.set_low();
            }
            self.srclk.set_high();
            self.srclk.set_low();
        }
    }
}

/// Display refresh task.
///
/// Reads the latest frame once per pass and lights each digit in turn.
#[embassy_executor::task]
pub async fn display_task(mut display: ShiftDisplay) {
    display.enable();
    loop {
        let frame = FRAME.lock(|f| f.get());
        for (position, glyph) in frame.iter().enumerate() {
            display.write_digit(position, segments(*glyph));
            Timer::after_millis(DIGIT_HOLD_MS).await;
        }
    }
}

/// Key task, one instance per key.
///
/// A press is a falling edge that still reads low after [`DEBOUNCE_MS`].
/// The task then waits for release so holding a key sends one event.
#[embassy_executor::task(pool_size = 5)]
pub async fn key_task(mut input: ExtiInput<'static>, key: Key) {
    loop {
        input.wait_for_falling_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;
        if input.is_low() {
            #[cfg(feature = "debug-mode")]
            defmt::info!("Key {}", key);

            KEYS.send(key).await;
            input.wait_for_high().await;
        }
    }
}
