//! Flow sensor input.

use embassy_stm32::exti::ExtiInput;

use watering::flow::PulseCounter;

/// Pulses from the flow sensor, drained by the one-second tick.
pub static PULSES: PulseCounter = PulseCounter::new();

/// Counts every rising edge of the sensor output. Does nothing else, so
/// no pulse is missed while the main loop is busy writing the EEPROM.
#[embassy_executor::task]
pub async fn pulse_task(mut input: ExtiInput<'static>) {
    loop {
        input.wait_for_rising_edge().await;
        PULSES.record();
    }
}
