//! In-memory stand-ins shared by the unit tests.
//!
//! Bus, pin and delay expectations come from `embedded-hal-mock`. What is
//! left here has no mock there: a byte store behind the `embedded-storage`
//! traits, and an output pin that cannot fail, which the controller needs.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use embedded_storage::{ReadStorage, Storage};

#[derive(Debug, PartialEq, Eq)]
pub struct MemError;

/// 256-byte byte-addressable store.
pub struct MemStorage {
    pub bytes: [u8; 256],
    pub writes: usize,
    pub fail_writes: bool,
}

impl MemStorage {
    /// Factory state of an EEPROM: every byte reads 0xFF.
    pub fn erased() -> Self {
        Self {
            bytes: [0xFF; 256],
            writes: 0,
            fail_writes: false,
        }
    }

    pub fn zeroed() -> Self {
        Self {
            bytes: [0; 256],
            ..Self::erased()
        }
    }

    pub fn total(&self) -> u32 {
        u32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }

    pub fn with_total(total: u32) -> Self {
        let mut mem = Self::zeroed();
        mem.bytes[..4].copy_from_slice(&total.to_le_bytes());
        mem
    }
}

impl ReadStorage for MemStorage {
    type Error = MemError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.bytes.len() {
            return Err(MemError);
        }
        bytes.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl Storage for MemStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MemError);
        }
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.bytes.len() {
            return Err(MemError);
        }
        self.bytes[start..end].copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}

/// Relay output that never fails, like the GPIO the controller drives.
///
/// The `embedded-hal-mock` pin reports `MockError`, so it only fits code
/// that is generic over the pin error.
#[derive(Default)]
pub struct RelayPin {
    pub high: bool,
    pub writes: usize,
}

impl OutputPin for RelayPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}
