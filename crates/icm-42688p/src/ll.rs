//! Register transport for the ICM-42688-P.
//!
//! [`RegisterInterface`] is the byte-level seam the driver is written
//! against. [`SpiInterface`] implements it over an `embedded-hal-async`
//! SPI bus with a manually driven chip-select line.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::{delay::DelayNs, spi::SpiBus};

use crate::registers::{Register, BANK_SEL_MASK};

/// Set on the address byte of a read transaction.
pub const READ_BIT: u8 = 0x80;

/// Settle time after asserting chip-select.
pub const CS_SETUP_US: u32 = 1;
/// Idle time after releasing chip-select.
pub const CS_HOLD_US: u32 = 1;

/// Byte-addressed access to the register file of the currently selected bank.
#[allow(async_fn_in_trait)]
pub trait RegisterInterface {
    type Error;

    /// Burst-reads `buf.len()` consecutive registers starting at `reg`.
    async fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes a single register.
    async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;

    async fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error> {
        let mut value = 0u8;
        self.read_registers(reg, core::slice::from_mut(&mut value))
            .await?;
        Ok(value)
    }

    /// Read-modify-write touching only the bits set in `mask`.
    async fn masked_write(&mut self, reg: u8, data: u8, mask: u8) -> Result<(), Self::Error> {
        let current = self.read_register(reg).await?;
        self.write_register(reg, (current & !mask) | (data & mask))
            .await
    }

    /// Writes REG_BANK_SEL. Only the low three bits of `bank` are used.
    async fn select_bank(&mut self, bank: impl Into<u8>) -> Result<(), Self::Error> {
        self.write_register(Register::REG_BANK_SEL.addr(), bank.into() & BANK_SEL_MASK)
            .await
    }
}

#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiInterfaceError<SpiE> {
    Spi(SpiE),
    #[from(ignore)]
    ChipSelect,
}

/// 4-wire SPI transport with a dedicated chip-select pin.
pub struct SpiInterface<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
}

impl<SPI, CS, D> SpiInterface<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: D) -> Self {
        Self { spi, cs, delay }
    }

    /// Gives back the bus, pin and delay.
    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }

    async fn select(&mut self) -> Result<(), SpiInterfaceError<SPI::Error>> {
        self.cs
            .set_low()
            .map_err(|_| SpiInterfaceError::ChipSelect)?;
        self.delay.delay_us(CS_SETUP_US).await;
        Ok(())
    }

    /// Releases chip-select after `result`, reporting the first failure.
    async fn deselect(
        &mut self,
        result: Result<(), SPI::Error>,
    ) -> Result<(), SpiInterfaceError<SPI::Error>> {
        let released = self
            .cs
            .set_high()
            .map_err(|_| SpiInterfaceError::ChipSelect);
        self.delay.delay_us(CS_HOLD_US).await;
        result?;
        released
    }

    async fn exchange_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), SPI::Error> {
        self.spi.write(&[reg | READ_BIT]).await?;
        buf.fill(0);
        self.spi.transfer_in_place(buf).await?;
        self.spi.flush().await
    }

    async fn exchange_write(&mut self, reg: u8, value: u8) -> Result<(), SPI::Error> {
        self.spi.write(&[reg & !READ_BIT, value]).await?;
        self.spi.flush().await
    }
}

impl<SPI, CS, D> RegisterInterface for SpiInterface<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    type Error = SpiInterfaceError<SPI::Error>;

    async fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.select().await?;
        let result = self.exchange_read(reg, buf).await;
        self.deselect(result).await
    }

    async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        self.select().await?;
        let result = self.exchange_write(reg, value).await;
        self.deselect(result).await
    }
}
