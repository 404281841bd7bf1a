//! Relay-driven water valve.
//!
//! The valve is a single binary output. Depending on the relay board the
//! output is active-high or active-low, so the electrical level is kept
//! separate from the logical open/closed state.

use embedded_hal::digital::v2::OutputPin;

/// Electrical level that energizes the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    #[default]
    High,
    Low,
}

/// Valve controlled through one output pin.
///
/// Tracks the last commanded state so repeated open or close requests do
/// not toggle the pin again.
pub struct Valve<P> {
    /// Relay control output
    pin: P,
    /// Level at which the relay is energized
    active: ActiveLevel,
    /// Last commanded state
    open: bool,
}

impl<P: OutputPin> Valve<P> {
    /// Creates a valve and drives it closed.
    ///
    /// # Arguments
    ///
    /// * `pin` - Relay control output
    /// * `active` - Level that opens the valve
    pub fn new(pin: P, active: ActiveLevel) -> Result<Self, P::Error> {
        let mut valve = Self {
            pin,
            active,
            open: false,
        };
        valve.drive(false)?;
        Ok(valve)
    }

    /// Opens the valve. No-op if it is already open.
    pub fn open(&mut self) -> Result<(), P::Error> {
        if self.open {
            return Ok(());
        }
        self.drive(true)?;
        self.open = true;
        Ok(())
    }

    /// Closes the valve. No-op if it is already closed.
    pub fn close(&mut self) -> Result<(), P::Error> {
        if !self.open {
            return Ok(());
        }
        self.drive(false)?;
        self.open = false;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Releases the output pin.
    pub fn free(self) -> P {
        self.pin
    }

    fn drive(&mut self, energize: bool) -> Result<(), P::Error> {
        match (self.active, energize) {
            (ActiveLevel::High, true) | (ActiveLevel::Low, false) => self.pin.set_high(),
            (ActiveLevel::High, false) | (ActiveLevel::Low, true) => self.pin.set_low(),
        }
    }
}
