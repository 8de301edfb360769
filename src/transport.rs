//! Register-level bus transport.
//!
//! The driver is polymorphic over anything that can read and write single
//! 8-bit registers at the controller's fixed device address. On hardware that
//! is an I2C peripheral wrapped in [`I2cRegisterBus`]; in tests it is a
//! scripted double that records transactions.

use embedded_hal::i2c::I2c;

use crate::{Error, Result};

/// Default 7-bit I2C address of the controller (all address pins low).
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Capability to read and write the controller's 8-bit registers.
///
/// Each call is one blocking bus transaction: it completes or fails, with no
/// internal retry. Retry policy belongs to the caller (see
/// [`PwmBus::write_channels_batched`](crate::bus::PwmBus::write_channels_batched)).
pub trait RegisterBus {
    /// Write an 8-bit value to the given register.
    fn write_byte(&mut self, register: u8, value: u8) -> Result<()>;

    /// Read an 8-bit value from the given register.
    fn read_byte(&mut self, register: u8) -> Result<u8>;
}

/// [`RegisterBus`] implementation over any [`embedded_hal::i2c::I2c`] bus.
///
/// # Example
///
/// ```rust,no_run
/// # fn example(i2c: impl embedded_hal::i2c::I2c) {
/// use servo_deck::transport::I2cRegisterBus;
///
/// let bus = I2cRegisterBus::new(i2c); // address 0x40
/// # }
/// ```
pub struct I2cRegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cRegisterBus<I2C> {
    /// Wrap an I2C bus using the default address (0x40).
    pub fn new(i2c: I2C) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Wrap an I2C bus using a custom 7-bit address.
    pub fn new_with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Release the underlying I2C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterBus for I2cRegisterBus<I2C> {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<()> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|_| Error::Bus)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buffer)
            .map_err(|_| Error::Bus)?;
        Ok(buffer[0])
    }
}
