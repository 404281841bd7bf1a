//! AT24C02 I2C EEPROM driver.
//!
//! 256 bytes of storage organized in 8-byte pages. A write that crosses a
//! page boundary wraps around inside the page on the chip, so writes are
//! split per page, and each page write is followed by the internal write
//! cycle wait. The driver exposes the chip through the `embedded-storage`
//! traits so the persisted layout does not depend on the bus.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use embedded_storage::{ReadStorage, Storage};

/// 7-bit bus address with A0..A2 tied low (0xA0 as an 8-bit write address).
pub const DEFAULT_ADDRESS: u8 = 0x50;

/// Total size of the chip in bytes.
pub const CAPACITY: usize = 256;

/// Page write buffer size of the chip.
const PAGE_SIZE: usize = 8;

/// Worst-case internal write cycle time from the datasheet.
const WRITE_CYCLE_MS: u8 = 10;

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus transaction failed (usually a NACK).
    I2c(E),
    /// The access extends past the end of the chip.
    OutOfBounds,
}

/// AT24C02 on a blocking I2C bus, exposed as [`Storage`].
///
/// Offsets are word addresses on the chip. Every write blocks for the
/// chip's write cycle once per touched page.
pub struct At24c02<I2C, D> {
    /// Bus the chip sits on
    i2c: I2C,
    /// Delay used to wait out the write cycle
    delay: D,
    /// 7-bit bus address
    address: u8,
}

impl<I2C, D, E> At24c02<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    /// Creates a driver for a chip at [`DEFAULT_ADDRESS`].
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Creates a driver for a chip with its address pins strapped.
    ///
    /// # Arguments
    ///
    /// * `i2c` - Blocking I2C bus
    /// * `delay` - Delay provider for the write cycle wait
    /// * `address` - 7-bit bus address, 0x50 to 0x57
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Releases the bus and delay provider.
    pub fn free(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn check_bounds(offset: u32, len: usize) -> Result<u8, Error<E>> {
        let start = offset as usize;
        if start >= CAPACITY || start + len > CAPACITY {
            return Err(Error::OutOfBounds);
        }
        Ok(start as u8)
    }
}

impl<I2C, D, E> ReadStorage for At24c02<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    type Error = Error<E>;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let word = Self::check_bounds(offset, bytes.len())?;
        // Random read: set the word address, then sequential read.
        self.i2c
            .write_read(self.address, &[word], bytes)
            .map_err(Error::I2c)
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl<I2C, D, E> Storage for At24c02<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
{
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut word = Self::check_bounds(offset, bytes.len())? as usize;
        let mut rest = bytes;
        let mut frame = [0u8; PAGE_SIZE + 1];

        while !rest.is_empty() {
            let room = PAGE_SIZE - word % PAGE_SIZE;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));

            frame[0] = word as u8;
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c
                .write(self.address, &frame[..=chunk.len()])
                .map_err(Error::I2c)?;
            // The chip ignores the bus until the write cycle completes.
            self.delay.delay_ms(WRITE_CYCLE_MS);

            word += chunk.len();
            rest = tail;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh0::MockError;
    use embedded_hal_mock::eh0::delay::NoopDelay;
    use embedded_hal_mock::eh0::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn write_is_split_at_page_boundaries() {
        let expectations = [
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x06, 1, 2]),
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x08, 3, 4, 5]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut eeprom = At24c02::new(i2c.clone(), NoopDelay::new());

        eeprom.write(0x06, &[1, 2, 3, 4, 5]).unwrap();
        i2c.done();
    }

    #[test]
    fn full_page_write_is_one_transaction() {
        let expectations = [I2cTransaction::write(
            DEFAULT_ADDRESS,
            vec![0x10, 9, 8, 7, 6, 5, 4, 3, 2],
        )];
        let mut i2c = I2cMock::new(&expectations);
        let mut eeprom = At24c02::new(i2c.clone(), NoopDelay::new());

        eeprom.write(0x10, &[9, 8, 7, 6, 5, 4, 3, 2]).unwrap();
        i2c.done();
    }

    #[test]
    fn read_sets_the_word_address_first() {
        let expectations = [I2cTransaction::write_read(
            DEFAULT_ADDRESS,
            vec![0x10],
            vec![9, 8, 7, 6, 5, 4, 3],
        )];
        let mut i2c = I2cMock::new(&expectations);
        let mut eeprom = At24c02::new(i2c.clone(), NoopDelay::new());

        let mut buf = [0u8; 7];
        eeprom.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7, 6, 5, 4, 3]);
        i2c.done();
    }

    #[test]
    fn uses_the_configured_address() {
        let expectations = [I2cTransaction::write(0x57, vec![0x00, 0xAA])];
        let mut i2c = I2cMock::new(&expectations);
        let mut eeprom = At24c02::with_address(i2c.clone(), NoopDelay::new(), 0x57);

        eeprom.write(0, &[0xAA]).unwrap();
        i2c.done();
    }

    #[test]
    fn rejects_access_past_the_end() {
        let mut i2c = I2cMock::new(&[] as &[I2cTransaction]);
        let mut eeprom = At24c02::new(i2c.clone(), NoopDelay::new());

        assert_eq!(eeprom.write(0xFE, &[0, 0, 0]), Err(Error::OutOfBounds));
        let mut buf = [0u8; 4];
        assert_eq!(eeprom.read(0x100, &mut buf), Err(Error::OutOfBounds));
        i2c.done();
    }

    #[test]
    fn reports_bus_errors() {
        let expectations = [I2cTransaction::write(DEFAULT_ADDRESS, vec![0x00, 1])
            .with_error(MockError::Io(std::io::ErrorKind::Other))];
        let mut i2c = I2cMock::new(&expectations);
        let mut eeprom = At24c02::new(i2c.clone(), NoopDelay::new());

        assert!(matches!(eeprom.write(0, &[1]), Err(Error::I2c(_))));
        i2c.done();
    }
}
