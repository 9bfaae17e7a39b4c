//! In-memory stand-ins for the ICM-42688-P and the HAL traits it sits on.
//!
//! [`FakeDevice`] models the banked register file closely enough to drive
//! the full bring-up, configuration and calibration sequences without
//! hardware. [`FakeSpiBus`] and [`FakePin`] record SPI framing for
//! [`SpiInterface`](crate::SpiInterface).

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal_async::{
    delay::DelayNs,
    spi::{ErrorType as SpiErrorType, SpiBus},
};
use heapless::Vec;

use crate::{
    ll::RegisterInterface,
    registers::{DeviceConfigReg, Register, BANK_SEL_MASK, WHO_AM_I_VALUE},
};

const BANKS: usize = 8;
const WRITE_LOG_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FakeError {
    /// Returned by every transaction once the injected failure point is reached.
    Injected,
}

/// A register write as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub bank: u8,
    pub reg: u8,
    pub value: u8,
}

/// Register-level model of the sensor.
pub struct FakeDevice {
    regs: [[u8; 256]; BANKS],
    bank: u8,
    who_am_i: u8,
    transactions: usize,
    fail_at: Option<usize>,
    writes: Vec<WriteRecord, WRITE_LOG_CAPACITY>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    pub fn new() -> Self {
        let mut device = Self {
            regs: [[0; 256]; BANKS],
            bank: 0,
            who_am_i: WHO_AM_I_VALUE,
            transactions: 0,
            fail_at: None,
            writes: Vec::new(),
        };
        device.power_on_reset();
        device
    }

    /// Device answering WHO_AM_I with `id`.
    pub fn with_who_am_i(id: u8) -> Self {
        let mut device = Self::new();
        device.set_who_am_i(id);
        device
    }

    /// Changes the identity reported from now on, including after resets.
    pub fn set_who_am_i(&mut self, id: u8) {
        self.who_am_i = id;
        self.regs[0][Register::WHO_AM_I.addr() as usize] = id;
    }

    /// Every transaction from the `n`-th onwards (zero based) fails.
    pub fn fail_from(&mut self, n: usize) {
        self.fail_at = Some(n);
    }

    pub fn clear_failure(&mut self) {
        self.fail_at = None;
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn transactions(&self) -> usize {
        self.transactions
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    pub fn register(&self, bank: u8, reg: u8) -> u8 {
        self.regs[(bank & BANK_SEL_MASK) as usize][reg as usize]
    }

    /// Pokes a register without going through the transport.
    pub fn set_register(&mut self, bank: u8, reg: u8, value: u8) {
        self.regs[(bank & BANK_SEL_MASK) as usize][reg as usize] = value;
    }

    pub fn set_accel_raw(&mut self, raw: [i16; 3]) {
        self.set_axes(Register::ACCEL_DATA_X1, raw);
    }

    pub fn set_gyro_raw(&mut self, raw: [i16; 3]) {
        self.set_axes(Register::GYRO_DATA_X1, raw);
    }

    pub fn set_temperature_raw(&mut self, raw: i16) {
        let base = Register::TEMP_DATA1.addr() as usize;
        self.regs[0][base..base + 2].copy_from_slice(&raw.to_be_bytes());
    }

    /// Latches bits into INT_STATUS until the next read of it.
    pub fn raise_int_status(&mut self, bits: u8) {
        self.regs[0][Register::INT_STATUS.addr() as usize] |= bits;
    }

    fn set_axes(&mut self, first: Register, raw: [i16; 3]) {
        let base = first.addr() as usize;
        for (i, value) in raw.iter().enumerate() {
            self.regs[0][base + 2 * i..base + 2 * i + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Restores configuration registers. Sensor output registers keep their
    /// contents so programmed samples survive a soft reset.
    fn power_on_reset(&mut self) {
        let data_start = Register::TEMP_DATA1.addr() as usize;
        let data_end = Register::GYRO_DATA_X1.addr() as usize + 6;
        let mut data = [0u8; 16];
        data[..data_end - data_start].copy_from_slice(&self.regs[0][data_start..data_end]);

        self.regs = [[0; 256]; BANKS];
        self.bank = 0;
        for reg in [
            Register::INT_CONFIG,
            Register::INTF_CONFIG0,
            Register::PWR_MGMT0,
            Register::GYRO_CONFIG0,
            Register::ACCEL_CONFIG0,
            Register::INT_SOURCE0,
        ] {
            let bank: u8 = reg.bank().into();
            self.regs[bank as usize][reg.addr() as usize] = reg.reset_value();
        }
        self.regs[0][Register::WHO_AM_I.addr() as usize] = self.who_am_i;
        self.regs[0][data_start..data_end].copy_from_slice(&data[..data_end - data_start]);
    }

    fn begin(&mut self) -> Result<(), FakeError> {
        let n = self.transactions;
        self.transactions += 1;
        match self.fail_at {
            Some(at) if n >= at => Err(FakeError::Injected),
            _ => Ok(()),
        }
    }
}

impl RegisterInterface for FakeDevice {
    type Error = FakeError;

    async fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.begin()?;
        let bank = self.bank as usize;
        for (offset, byte) in buf.iter_mut().enumerate() {
            let addr = reg.wrapping_add(offset as u8);
            *byte = self.regs[bank][addr as usize];
            if bank == 0 && addr == Register::INT_STATUS.addr() {
                self.regs[0][addr as usize] = 0;
            }
        }
        Ok(())
    }

    async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        self.begin()?;
        let _ = self.writes.push(WriteRecord {
            bank: self.bank,
            reg,
            value,
        });

        if reg == Register::REG_BANK_SEL.addr() {
            self.bank = value & BANK_SEL_MASK;
            return Ok(());
        }
        if self.bank == 0
            && reg == Register::DEVICE_CONFIG.addr()
            && DeviceConfigReg::from_bits_retain(value).contains(DeviceConfigReg::SOFT_RESET_CONFIG)
        {
            self.power_on_reset();
            return Ok(());
        }
        self.regs[self.bank as usize][reg as usize] = value;
        Ok(())
    }
}

/// Accumulates requested delays instead of waiting.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeDelay {
    pub elapsed_ns: u64,
}

impl FakeDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

/// Records every byte clocked out and answers reads from a canned response.
#[derive(Debug, Default)]
pub struct FakeSpiBus {
    pub written: Vec<u8, 64>,
    pub response: Vec<u8, 64>,
    pub flushes: usize,
}

impl FakeSpiBus {
    pub fn with_response(bytes: &[u8]) -> Self {
        let mut bus = Self::default();
        let _ = bus.response.extend_from_slice(bytes);
        bus
    }

    fn next_response(&mut self) -> u8 {
        if self.response.is_empty() {
            0
        } else {
            self.response.remove(0)
        }
    }
}

impl SpiErrorType for FakeSpiBus {
    type Error = Infallible;
}

impl SpiBus<u8> for FakeSpiBus {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.next_response();
        }
        Ok(())
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let _ = self.written.extend_from_slice(words);
        Ok(())
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let _ = self.written.extend_from_slice(write);
        for word in read.iter_mut() {
            *word = self.next_response();
        }
        Ok(())
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            let _ = self.written.push(*word);
            *word = self.next_response();
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.flushes += 1;
        Ok(())
    }
}

/// Output pin remembering every level it was driven to.
#[derive(Debug, Default)]
pub struct FakePin {
    pub levels: Vec<bool, 32>,
}

impl FakePin {
    pub fn is_high(&self) -> bool {
        self.levels.last().copied().unwrap_or(true)
    }
}

impl PinErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let _ = self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let _ = self.levels.push(true);
        Ok(())
    }
}
