#![no_std]

#[macro_use]
mod fmt;

pub mod errors;
pub mod ll;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod registers;

pub use errors::Error;
pub use ll::{RegisterInterface, SpiInterface, SpiInterfaceError};
pub use micromath::vector::F32x3;
pub use registers::*;

use embedded_hal_async::delay::DelayNs;

/// Wait after issuing a soft reset.
pub const RESET_DELAY_MS: u32 = 1;
/// Additional settle time after reset before the first access.
pub const POST_RESET_DELAY_MS: u32 = 100;
/// Wait after powering the sensors up during bring-up.
pub const POWER_UP_DELAY_MS: u32 = 30;
/// Wait after enabling sensors before sampling them.
pub const SENSOR_SETTLE_DELAY_MS: u32 = 50;
/// Samples averaged by the calibration routines.
pub const CALIBRATION_SAMPLES: u16 = 500;
/// Spacing between calibration samples.
pub const CALIBRATION_SAMPLE_DELAY_MS: u32 = 2;

/// Temperature sensitivity in LSB/°C.
pub const TEMP_SENSITIVITY: f32 = 132.48;
/// Temperature reading at a raw value of zero, in °C.
pub const TEMP_OFFSET: f32 = 25.0;

/// One gravity at the ±2g range, in g.
const ONE_G_AT_2G: f32 = 16384.0 * ACCEL_SCALE_2G;

/// Full-scale ranges the driver programs and scales samples with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub accel_full_scale: AccelFullScale,
    pub gyro_full_scale: GyroFullScale,
}

impl DeviceConfig {
    /// Ranges selected by FS code 0, as after power-on or a soft reset.
    pub const POWER_ON: Self = Self {
        accel_full_scale: AccelFullScale::G16,
        gyro_full_scale: GyroFullScale::Dps2000,
    };
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::POWER_ON
    }
}

/// Offsets measured while the device is at rest.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationBias {
    /// Accelerometer offset in g, gravity removed from Z
    pub accel: F32x3,
    /// Gyroscope offset in dps
    pub gyro: F32x3,
}

pub struct Icm42688p<I, D> {
    interface: I,
    delay: D,
    /// Ranges programmed by `init`
    config: DeviceConfig,
    /// Ranges samples are scaled with
    active: DeviceConfig,
}

impl<I, D> Icm42688p<I, D>
where
    I: RegisterInterface,
    D: DelayNs,
{
    pub fn new(interface: I, delay: D) -> Self {
        Self::new_with_config(interface, delay, DeviceConfig::default())
    }

    /// The full-scale ranges in `config` are programmed by [`Self::init`].
    pub fn new_with_config(interface: I, delay: D, config: DeviceConfig) -> Self {
        Self {
            interface,
            delay,
            config,
            active: DeviceConfig::POWER_ON,
        }
    }

    /// Bring-up ranges. Never changed by the full-scale setters.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Ranges last programmed into the device, used to scale samples.
    pub fn active_config(&self) -> &DeviceConfig {
        &self.active
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn release(self) -> (I, D) {
        (self.interface, self.delay)
    }

    pub async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    /// Burst read in the currently selected bank.
    pub async fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I::Error>> {
        Ok(self.interface.read_registers(reg, buf).await?)
    }

    /// Single register write in the currently selected bank.
    pub async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error<I::Error>> {
        Ok(self.interface.write_register(reg, value).await?)
    }

    /// Replaces the bits selected by `mask` with those of `data`.
    pub async fn masked_write(
        &mut self,
        reg: u8,
        data: u8,
        mask: u8,
    ) -> Result<(), Error<I::Error>> {
        Ok(self.interface.masked_write(reg, data, mask).await?)
    }

    /// Switches the register bank. Only bits 2:0 of `bank` are used.
    pub async fn select_bank(&mut self, bank: impl Into<u8>) -> Result<(), Error<I::Error>> {
        Ok(self.interface.select_bank(bank).await?)
    }

    /// Bring-up: reset, identity check, interface setup, power-up and
    /// the full-scale ranges from [`Self::config`].
    ///
    /// Data-ready is discovered by polling [`Self::is_data_ready`]. The
    /// host-side INT1 input (rising edge, matching [`Self::enable_interrupt`])
    /// belongs to the board and is left to the caller.
    pub async fn init(&mut self) -> Result<(), Error<I::Error>> {
        self.reset().await?;
        self.delay.delay_ms(POST_RESET_DELAY_MS).await;

        let who_am_i = self.device_id().await?;
        if who_am_i != WHO_AM_I_VALUE {
            error!("WHO_AM_I mismatch: got {=u8:#x}", who_am_i);
            return Err(Error::InvalidWhoAmI);
        }

        // SPI only
        self.write(Register::INTF_CONFIG0, IntfConfig0::UI_SIFS_CFG_I2C_DISABLE.bits())
            .await?;

        let pwr = PwrMgmt0::empty()
            .with_accel_mode(AccelMode::LowNoise)
            .with_gyro_mode(GyroMode::LowNoise)
            .with_temp_disabled(false);
        self.write(Register::PWR_MGMT0, pwr.bits()).await?;
        self.delay.delay_ms(POWER_UP_DELAY_MS).await;

        let DeviceConfig {
            accel_full_scale,
            gyro_full_scale,
        } = self.config;
        self.set_accel_full_scale(accel_full_scale).await?;
        self.set_gyro_full_scale(gyro_full_scale).await?;

        info!("ICM-42688-P initialized");
        Ok(())
    }

    /// Powers the accelerometer off, the gyroscope to standby and disables
    /// the temperature sensor.
    pub async fn deinit(&mut self) -> Result<(), Error<I::Error>> {
        let pwr = PwrMgmt0::empty()
            .with_accel_mode(AccelMode::Off)
            .with_gyro_mode(GyroMode::Standby)
            .with_temp_disabled(true);
        self.write(Register::PWR_MGMT0, pwr.bits()).await
    }

    /// Soft reset. Configuration returns to power-on values.
    pub async fn reset(&mut self) -> Result<(), Error<I::Error>> {
        self.write(Register::DEVICE_CONFIG, DeviceConfigReg::SOFT_RESET_CONFIG.bits())
            .await?;
        self.active = DeviceConfig::POWER_ON;
        self.delay.delay_ms(RESET_DELAY_MS).await;
        Ok(())
    }

    pub async fn device_id(&mut self) -> Result<u8, Error<I::Error>> {
        self.read(Register::WHO_AM_I).await
    }

    /// Requests the closest supported rate: 1 kHz for `>= 1000`, 200 Hz
    /// otherwise. Returns the rate applied.
    pub async fn set_sample_rate(&mut self, sample_rate: f32) -> Result<f32, Error<I::Error>> {
        let odr = if sample_rate >= 1000.0 {
            OutputDataRate::Odr1kHz
        } else {
            OutputDataRate::Odr200Hz
        };

        self.modify(Register::GYRO_CONFIG0, |v| {
            GyroConfig0::from_bits_retain(v).with_odr(odr).bits()
        })
        .await?;
        self.modify(Register::ACCEL_CONFIG0, |v| {
            AccelConfig0::from_bits_retain(v).with_odr(odr).bits()
        })
        .await?;

        debug!("Sample rate set to {} Hz", odr.hz());
        Ok(odr.hz())
    }

    /// Writes the full-scale code together with the 1 kHz ODR.
    pub async fn set_accel_full_scale(
        &mut self,
        fs: AccelFullScale,
    ) -> Result<(), Error<I::Error>> {
        let value = AccelConfig0::empty()
            .with_full_scale(fs)
            .with_odr(OutputDataRate::Odr1kHz);
        self.write(Register::ACCEL_CONFIG0, value.bits()).await?;
        self.active.accel_full_scale = fs;
        Ok(())
    }

    /// Writes the full-scale code together with the 1 kHz ODR.
    pub async fn set_gyro_full_scale(
        &mut self,
        fs: GyroFullScale,
    ) -> Result<(), Error<I::Error>> {
        let value = GyroConfig0::empty()
            .with_full_scale(fs)
            .with_odr(OutputDataRate::Odr1kHz);
        self.write(Register::GYRO_CONFIG0, value.bits()).await?;
        self.active.gyro_full_scale = fs;
        Ok(())
    }

    /// Sets the accelerometer ODR field from a raw 4-bit code.
    pub async fn set_accel_bandwidth(&mut self, code: u8) -> Result<(), Error<I::Error>> {
        self.modify(Register::ACCEL_CONFIG0, |v| {
            AccelConfig0::from_bits_retain(v).with_odr_code(code).bits()
        })
        .await
    }

    /// Sets the gyroscope ODR field from a raw 4-bit code.
    pub async fn set_gyro_bandwidth(&mut self, code: u8) -> Result<(), Error<I::Error>> {
        self.modify(Register::GYRO_CONFIG0, |v| {
            GyroConfig0::from_bits_retain(v).with_odr_code(code).bits()
        })
        .await
    }

    pub async fn set_accel_odr(&mut self, odr: OutputDataRate) -> Result<(), Error<I::Error>> {
        self.set_accel_bandwidth(odr.code()).await
    }

    pub async fn set_gyro_odr(&mut self, odr: OutputDataRate) -> Result<(), Error<I::Error>> {
        self.set_gyro_bandwidth(odr.code()).await
    }

    /// Full-scale range currently programmed in the device.
    pub async fn accel_full_scale(&mut self) -> Result<AccelFullScale, Error<I::Error>> {
        let value = self.read(Register::ACCEL_CONFIG0).await?;
        Ok(AccelConfig0::from_bits_retain(value).full_scale())
    }

    /// Full-scale range currently programmed in the device.
    pub async fn gyro_full_scale(&mut self) -> Result<GyroFullScale, Error<I::Error>> {
        let value = self.read(Register::GYRO_CONFIG0).await?;
        Ok(GyroConfig0::from_bits_retain(value).full_scale())
    }

    /// g/LSB of the range currently programmed in the device.
    pub async fn accel_resolution(&mut self) -> Result<f32, Error<I::Error>> {
        Ok(self.accel_full_scale().await?.resolution())
    }

    /// dps/LSB of the range currently programmed in the device.
    pub async fn gyro_resolution(&mut self) -> Result<f32, Error<I::Error>> {
        Ok(self.gyro_full_scale().await?.resolution())
    }

    /// Turns each sensor on (low-noise mode) or off.
    pub async fn enable_sensors(
        &mut self,
        accel: bool,
        gyro: bool,
        temp: bool,
    ) -> Result<(), Error<I::Error>> {
        let pwr = PwrMgmt0::empty()
            .with_accel_mode(if accel { AccelMode::LowNoise } else { AccelMode::Off })
            .with_gyro_mode(if gyro { GyroMode::LowNoise } else { GyroMode::Off })
            .with_temp_disabled(!temp);
        self.write(Register::PWR_MGMT0, pwr.bits()).await?;
        debug!("Sensors: accel={} gyro={} temp={}", accel, gyro, temp);
        Ok(())
    }

    /// Configures INT1 as active-high push-pull pulsed and routes the
    /// data-ready interrupt to it when `data_ready` is set.
    pub async fn enable_interrupt(&mut self, data_ready: bool) -> Result<(), Error<I::Error>> {
        let int_config = IntConfig::empty()
            .with_int1_polarity(Int1Polarity::ActiveHigh)
            .with_int1_drive(Int1Drive::PushPull)
            .with_int1_mode(Int1Mode::Pulsed);
        self.write(Register::INT_CONFIG, int_config.bits()).await?;

        let source = IntSource0::empty().with_ui_drdy_int1_en(data_ready);
        Ok(self
            .interface
            .masked_write(
                Register::INT_SOURCE0.addr(),
                source.bits(),
                IntSource0::UI_DRDY_INT1_EN.bits(),
            )
            .await?)
    }

    /// INT_STATUS in the low byte and the following register in the high
    /// byte. Reading clears the latched status bits.
    pub async fn read_interrupt_status(&mut self) -> Result<u16, Error<I::Error>> {
        let mut buf = [0u8; 2];
        self.read_into(Register::INT_STATUS, &mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }

    pub async fn is_data_ready(&mut self) -> Result<bool, Error<I::Error>> {
        let status = self.read(Register::INT_STATUS).await?;
        Ok(IntStatus::from_bits_retain(status).data_ready())
    }

    pub async fn read_raw_accel(&mut self) -> Result<[i16; 3], Error<I::Error>> {
        self.read_axes(Register::ACCEL_DATA_X1).await
    }

    pub async fn read_raw_gyro(&mut self) -> Result<[i16; 3], Error<I::Error>> {
        self.read_axes(Register::GYRO_DATA_X1).await
    }

    /// Acceleration in g, scaled by the active full-scale range.
    pub async fn read_accel(&mut self) -> Result<F32x3, Error<I::Error>> {
        let raw = self.read_raw_accel().await?;
        Ok(scale(raw, self.active.accel_full_scale.resolution()))
    }

    /// Angular rate in dps, scaled by the active full-scale range.
    pub async fn read_gyro(&mut self) -> Result<F32x3, Error<I::Error>> {
        let raw = self.read_raw_gyro().await?;
        Ok(scale(raw, self.active.gyro_full_scale.resolution()))
    }

    /// Die temperature in °C.
    pub async fn read_temperature(&mut self) -> Result<f32, Error<I::Error>> {
        let mut buf = [0u8; 2];
        self.read_into(Register::TEMP_DATA1, &mut buf).await?;
        let raw = i16::from_be_bytes(buf);
        Ok(f32::from(raw) / TEMP_SENSITIVITY + TEMP_OFFSET)
    }

    /// Mean gyroscope reading over [`CALIBRATION_SAMPLES`] samples. The
    /// device must be stationary and the gyroscope running.
    pub async fn calibrate_gyro(&mut self) -> Result<F32x3, Error<I::Error>> {
        info!("Calibrating gyroscope, keep the device still");

        let mut sum = F32x3::default();
        for _ in 0..CALIBRATION_SAMPLES {
            let sample = self.read_gyro().await?;
            accumulate(&mut sum, sample);
            self.delay.delay_ms(CALIBRATION_SAMPLE_DELAY_MS).await;
        }

        let bias = mean(sum, CALIBRATION_SAMPLES);
        info!("Gyro bias: {} {} {}", bias.x, bias.y, bias.z);
        Ok(bias)
    }

    /// Averages both sensors at ±2g / ±250dps and 200 Hz with gravity
    /// removed from Z. Leaves all sensors powered off.
    pub async fn calibrate_accel_and_gyro(&mut self) -> Result<CalibrationBias, Error<I::Error>> {
        info!("Calibrating accelerometer and gyroscope, keep the device level");

        self.enable_sensors(false, false, false).await?;
        self.set_accel_full_scale(AccelFullScale::G2).await?;
        self.set_gyro_full_scale(GyroFullScale::Dps250).await?;
        self.set_accel_odr(OutputDataRate::Odr200Hz).await?;
        self.set_gyro_odr(OutputDataRate::Odr200Hz).await?;

        self.enable_sensors(true, true, true).await?;
        self.delay.delay_ms(SENSOR_SETTLE_DELAY_MS).await;

        let mut accel_sum = F32x3::default();
        let mut gyro_sum = F32x3::default();
        for _ in 0..CALIBRATION_SAMPLES {
            let accel = self.read_accel().await?;
            let gyro = self.read_gyro().await?;
            accumulate(&mut accel_sum, accel);
            accumulate(&mut gyro_sum, gyro);
            self.delay.delay_ms(CALIBRATION_SAMPLE_DELAY_MS).await;
        }

        let mut accel = mean(accel_sum, CALIBRATION_SAMPLES);
        let gyro = mean(gyro_sum, CALIBRATION_SAMPLES);

        // Remove gravity from whichever way Z points
        if accel.z > 0.0 {
            accel.z -= ONE_G_AT_2G;
        } else {
            accel.z += ONE_G_AT_2G;
        }

        self.enable_sensors(false, false, false).await?;

        info!("Accel bias: {} {} {}", accel.x, accel.y, accel.z);
        Ok(CalibrationBias { accel, gyro })
    }

    async fn read_axes(&mut self, first: Register) -> Result<[i16; 3], Error<I::Error>> {
        let mut buf = [0u8; 6];
        self.read_into(first, &mut buf).await?;
        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
    }

    async fn read(&mut self, reg: Register) -> Result<u8, Error<I::Error>> {
        let mut value = 0u8;
        self.read_into(reg, core::slice::from_mut(&mut value))
            .await?;
        Ok(value)
    }

    async fn read_into(&mut self, reg: Register, buf: &mut [u8]) -> Result<(), Error<I::Error>> {
        let bank = reg.bank();
        self.enter_bank(bank).await?;
        let result = self.interface.read_registers(reg.addr(), buf).await;
        self.leave_bank(bank, result).await
    }

    async fn write(&mut self, reg: Register, value: u8) -> Result<(), Error<I::Error>> {
        let bank = reg.bank();
        self.enter_bank(bank).await?;
        let result = self.interface.write_register(reg.addr(), value).await;
        self.leave_bank(bank, result).await
    }

    async fn modify<F>(&mut self, reg: Register, f: F) -> Result<(), Error<I::Error>>
    where
        F: FnOnce(u8) -> u8,
    {
        let bank = reg.bank();
        self.enter_bank(bank).await?;
        let result = match self.interface.read_register(reg.addr()).await {
            Ok(value) => self.interface.write_register(reg.addr(), f(value)).await,
            Err(e) => Err(e),
        };
        self.leave_bank(bank, result).await
    }

    async fn enter_bank(&mut self, bank: Bank) -> Result<(), Error<I::Error>> {
        if bank != Bank::Bank0 {
            self.interface.select_bank(bank).await?;
        }
        Ok(())
    }

    /// Switches back to bank 0 whether or not `result` failed.
    async fn leave_bank<T>(
        &mut self,
        bank: Bank,
        result: Result<T, I::Error>,
    ) -> Result<T, Error<I::Error>> {
        if bank != Bank::Bank0 {
            let restored = self.interface.select_bank(Bank::Bank0).await;
            let value = result?;
            restored?;
            return Ok(value);
        }
        Ok(result?)
    }
}

fn scale(raw: [i16; 3], resolution: f32) -> F32x3 {
    F32x3 {
        x: f32::from(raw[0]) * resolution,
        y: f32::from(raw[1]) * resolution,
        z: f32::from(raw[2]) * resolution,
    }
}

fn accumulate(sum: &mut F32x3, sample: F32x3) {
    sum.x += sample.x;
    sum.y += sample.y;
    sum.z += sample.z;
}

fn mean(sum: F32x3, samples: u16) -> F32x3 {
    let n = f32::from(samples);
    F32x3 {
        x: sum.x / n,
        y: sum.y / n,
        z: sum.z / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ll::{CS_HOLD_US, CS_SETUP_US},
        mock::{FakeDelay, FakeDevice, FakePin, FakeSpiBus},
    };

    fn driver() -> Icm42688p<FakeDevice, FakeDelay> {
        Icm42688p::new(FakeDevice::new(), FakeDelay::new())
    }

    fn bank1(device: &FakeDevice, reg: Register) -> u8 {
        device.register(1, reg.addr())
    }

    fn pwr_mgmt0(device: &FakeDevice) -> PwrMgmt0 {
        PwrMgmt0::from_bits_retain(device.register(0, Register::PWR_MGMT0.addr()))
    }

    fn int_source(device: &FakeDevice) -> IntSource0 {
        IntSource0::from_bits_retain(device.register(0, Register::INT_SOURCE0.addr()))
    }

    fn spi_interface(bus: FakeSpiBus) -> SpiInterface<FakeSpiBus, FakePin, FakeDelay> {
        SpiInterface::new(bus, FakePin::default(), FakeDelay::new())
    }

    // ---------------------------------------------------------------------------
    // Bring-up
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_init_programs_defaults() {
        let mut imu = driver();
        imu.init().await.unwrap();

        let device = imu.interface();
        assert_eq!(device.bank(), 0);
        assert_eq!(device.register(0, Register::INTF_CONFIG0.addr()), 0x03);

        let pwr = pwr_mgmt0(device);
        assert_eq!(pwr.accel_mode(), AccelMode::LowNoise);
        assert_eq!(pwr.gyro_mode(), GyroMode::LowNoise);
        assert!(!pwr.temp_disabled());

        // FS code 0 in bits 7:5 with the 1 kHz ODR code
        assert_eq!(bank1(device, Register::ACCEL_CONFIG0), 0x06);
        assert_eq!(bank1(device, Register::GYRO_CONFIG0), 0x06);
        assert_eq!(*imu.config(), DeviceConfig::default());
        assert_eq!(*imu.active_config(), DeviceConfig::POWER_ON);
    }

    #[futures_test::test]
    async fn test_init_restores_defaults_after_setters() {
        let mut imu = driver();
        imu.set_gyro_full_scale(GyroFullScale::Dps250).await.unwrap();
        imu.set_accel_full_scale(AccelFullScale::G2).await.unwrap();

        imu.init().await.unwrap();

        assert_eq!(imu.accel_full_scale().await.unwrap(), AccelFullScale::G16);
        assert_eq!(imu.gyro_full_scale().await.unwrap(), GyroFullScale::Dps2000);
        assert_eq!(*imu.active_config(), DeviceConfig::POWER_ON);
        assert_eq!(*imu.config(), DeviceConfig::default());
    }

    #[futures_test::test]
    async fn test_init_programs_custom_config() {
        let config = DeviceConfig {
            accel_full_scale: AccelFullScale::G4,
            gyro_full_scale: GyroFullScale::Dps500,
        };
        let mut imu = Icm42688p::new_with_config(FakeDevice::new(), FakeDelay::new(), config);
        imu.init().await.unwrap();
        imu.set_accel_full_scale(AccelFullScale::G2).await.unwrap();

        // A second bring-up goes back to the configured ranges
        imu.init().await.unwrap();
        assert_eq!(imu.accel_full_scale().await.unwrap(), AccelFullScale::G4);
        assert_eq!(imu.gyro_full_scale().await.unwrap(), GyroFullScale::Dps500);
        assert_eq!(*imu.active_config(), config);
    }

    #[futures_test::test]
    async fn test_reset_returns_scaling_to_power_on_range() {
        let mut imu = driver();
        imu.set_accel_full_scale(AccelFullScale::G2).await.unwrap();
        imu.set_gyro_full_scale(GyroFullScale::Dps250).await.unwrap();

        imu.reset().await.unwrap();
        imu.interface_mut().set_accel_raw([0x0400, 0, 0]);
        imu.interface_mut().set_gyro_raw([1024, 0, 0]);

        assert_eq!(imu.accel_resolution().await.unwrap(), ACCEL_SCALE_16G);
        assert_eq!(imu.read_accel().await.unwrap().x, 0.5);
        assert_eq!(imu.read_gyro().await.unwrap().x, 1024.0 * GYRO_SCALE_2000DPS);
        assert_eq!(*imu.active_config(), DeviceConfig::POWER_ON);
    }

    #[futures_test::test]
    async fn test_init_waits_for_reset_and_power_up() {
        let mut imu = driver();
        imu.init().await.unwrap();

        let expected = RESET_DELAY_MS + POST_RESET_DELAY_MS + POWER_UP_DELAY_MS;
        assert_eq!(imu.delay().elapsed_ms(), u64::from(expected));
    }

    #[futures_test::test]
    async fn test_init_rejects_wrong_identity() {
        let mut imu = Icm42688p::new(FakeDevice::with_who_am_i(0x12), FakeDelay::new());

        assert_eq!(imu.init().await, Err(Error::InvalidWhoAmI));
        // Nothing configured past the identity check
        let device = imu.interface();
        assert_eq!(device.register(0, Register::INTF_CONFIG0.addr()), 0x30);
        assert_eq!(device.register(0, Register::PWR_MGMT0.addr()), 0x00);
    }

    #[futures_test::test]
    async fn test_init_propagates_transport_error() {
        let mut device = FakeDevice::new();
        device.fail_from(0);
        let mut imu = Icm42688p::new(device, FakeDelay::new());

        assert!(matches!(imu.init().await, Err(Error::Interface(_))));
    }

    #[futures_test::test]
    async fn test_device_id() {
        let mut imu = driver();
        assert_eq!(imu.device_id().await.unwrap(), WHO_AM_I_VALUE);
    }

    #[futures_test::test]
    async fn test_deinit_powers_down() {
        let mut imu = driver();
        imu.init().await.unwrap();
        imu.deinit().await.unwrap();

        let pwr = pwr_mgmt0(imu.interface());
        assert_eq!(pwr.accel_mode(), AccelMode::Off);
        assert_eq!(pwr.gyro_mode(), GyroMode::Standby);
        assert!(pwr.temp_disabled());
    }

    // ---------------------------------------------------------------------------
    // Banked configuration
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_full_scale_round_trip() {
        let mut imu = driver();

        for fs in AccelFullScale::ALL {
            imu.set_accel_full_scale(fs).await.unwrap();
            assert_eq!(imu.accel_full_scale().await.unwrap(), fs);
            assert_eq!(imu.accel_resolution().await.unwrap(), fs.resolution());
        }
        for fs in GyroFullScale::ALL {
            imu.set_gyro_full_scale(fs).await.unwrap();
            assert_eq!(imu.gyro_full_scale().await.unwrap(), fs);
            assert_eq!(imu.gyro_resolution().await.unwrap(), fs.resolution());
        }
    }

    #[futures_test::test]
    async fn test_unknown_accel_full_scale_code_decodes_widest() {
        let mut imu = driver();

        for code in 4u8..=7 {
            let value = (code << 5) | OutputDataRate::Odr1kHz.code();
            imu.interface_mut().set_register(1, Register::ACCEL_CONFIG0.addr(), value);

            assert_eq!(imu.accel_full_scale().await.unwrap(), AccelFullScale::G16);
            assert_eq!(imu.accel_resolution().await.unwrap(), ACCEL_SCALE_16G);
        }
        assert_eq!(imu.interface().bank(), 0);
    }

    #[futures_test::test]
    async fn test_banked_access_returns_to_bank0() {
        let mut imu = driver();

        imu.set_accel_full_scale(AccelFullScale::G4).await.unwrap();
        assert_eq!(imu.interface().bank(), 0);
        imu.accel_resolution().await.unwrap();
        assert_eq!(imu.interface().bank(), 0);
        imu.set_sample_rate(200.0).await.unwrap();
        assert_eq!(imu.interface().bank(), 0);

        let writes = imu.interface().writes();
        let last = writes.last().unwrap();
        assert_eq!(last.reg, Register::REG_BANK_SEL.addr());
        assert_eq!(last.value, 0);
    }

    #[futures_test::test]
    async fn test_bank_restored_after_failed_access() {
        let mut imu = driver();
        // Transaction 0 selects bank 1, transaction 1 is the register write
        imu.interface_mut().fail_from(1);

        let result = imu.set_gyro_full_scale(GyroFullScale::Dps500).await;
        assert!(matches!(result, Err(Error::Interface(_))));
        // Active range untouched on failure
        assert_eq!(imu.active_config().gyro_full_scale, GyroFullScale::Dps2000);
        // Restore was still attempted after the failure
        assert_eq!(imu.interface().transactions(), 3);
    }

    #[futures_test::test]
    async fn test_set_sample_rate_threshold() {
        let mut imu = driver();

        assert_eq!(imu.set_sample_rate(1000.0).await.unwrap(), 1000.0);
        assert_eq!(bank1(imu.interface(), Register::GYRO_CONFIG0) & 0x0F, 0x06);
        assert_eq!(bank1(imu.interface(), Register::ACCEL_CONFIG0) & 0x0F, 0x06);

        assert_eq!(imu.set_sample_rate(999.9).await.unwrap(), 200.0);
        assert_eq!(bank1(imu.interface(), Register::GYRO_CONFIG0) & 0x0F, 0x07);
        assert_eq!(bank1(imu.interface(), Register::ACCEL_CONFIG0) & 0x0F, 0x07);

        assert_eq!(imu.set_sample_rate(4000.0).await.unwrap(), 1000.0);
    }

    #[futures_test::test]
    async fn test_set_sample_rate_preserves_full_scale() {
        let mut imu = driver();
        imu.interface_mut().set_register(1, Register::GYRO_CONFIG0.addr(), 0xA9);
        imu.interface_mut().set_register(1, Register::ACCEL_CONFIG0.addr(), 0x5F);

        imu.set_sample_rate(200.0).await.unwrap();

        assert_eq!(bank1(imu.interface(), Register::GYRO_CONFIG0), 0xA7);
        assert_eq!(bank1(imu.interface(), Register::ACCEL_CONFIG0), 0x57);
    }

    #[futures_test::test]
    async fn test_bandwidth_sets_low_nibble_only() {
        let mut imu = driver();
        imu.set_accel_full_scale(AccelFullScale::G2).await.unwrap();
        imu.set_gyro_full_scale(GyroFullScale::Dps250).await.unwrap();

        imu.set_accel_bandwidth(0xF7).await.unwrap();
        imu.set_gyro_odr(OutputDataRate::Odr500Hz).await.unwrap();

        assert_eq!(bank1(imu.interface(), Register::ACCEL_CONFIG0), 0x67);
        assert_eq!(bank1(imu.interface(), Register::GYRO_CONFIG0), 0x6F);
    }

    // ---------------------------------------------------------------------------
    // Power and interrupts
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_enable_sensors() {
        let mut imu = driver();

        imu.enable_sensors(true, false, false).await.unwrap();
        let pwr = pwr_mgmt0(imu.interface());
        assert_eq!(pwr.accel_mode(), AccelMode::LowNoise);
        assert_eq!(pwr.gyro_mode(), GyroMode::Off);
        assert!(pwr.temp_disabled());

        imu.enable_sensors(false, true, true).await.unwrap();
        let pwr = pwr_mgmt0(imu.interface());
        assert_eq!(pwr.accel_mode(), AccelMode::Off);
        assert_eq!(pwr.gyro_mode(), GyroMode::LowNoise);
        assert!(!pwr.temp_disabled());
    }

    #[futures_test::test]
    async fn test_enable_interrupt_routes_data_ready() {
        let mut imu = driver();
        // Other INT_SOURCE0 bits are left alone
        imu.interface_mut()
            .set_register(0, Register::INT_SOURCE0.addr(), IntSource0::FIFO_THS_INT1_EN.bits());

        imu.enable_interrupt(true).await.unwrap();
        let device = imu.interface();
        assert_eq!(device.register(0, Register::INT_CONFIG.addr()), 0x03);
        let source = int_source(device);
        assert!(source.ui_drdy_int1_en());
        assert!(source.contains(IntSource0::FIFO_THS_INT1_EN));

        imu.enable_interrupt(false).await.unwrap();
        let source = int_source(imu.interface());
        assert!(!source.ui_drdy_int1_en());
        assert!(source.contains(IntSource0::FIFO_THS_INT1_EN));
    }

    #[futures_test::test]
    async fn test_interrupt_status_is_read_to_clear() {
        let mut imu = driver();
        imu.interface_mut().raise_int_status(IntStatus::DATA_RDY_INT.bits());
        imu.interface_mut().set_register(0, Register::INT_STATUS.addr() + 1, 0x02);

        assert_eq!(imu.read_interrupt_status().await.unwrap(), 0x0208);
        assert_eq!(imu.read_interrupt_status().await.unwrap(), 0x0200);
    }

    #[futures_test::test]
    async fn test_data_ready_flag() {
        let mut imu = driver();
        assert!(!imu.is_data_ready().await.unwrap());

        imu.interface_mut().raise_int_status(IntStatus::DATA_RDY_INT.bits());
        assert!(imu.is_data_ready().await.unwrap());
        assert!(!imu.is_data_ready().await.unwrap());

        imu.interface_mut().raise_int_status(IntStatus::RESET_DONE_INT.bits());
        assert!(!imu.is_data_ready().await.unwrap());
    }

    // ---------------------------------------------------------------------------
    // Sample readout
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_read_accel_scales_by_full_scale() {
        let mut imu = driver();
        imu.init().await.unwrap();
        imu.interface_mut().set_accel_raw([0x0400, -0x0400, 0]);

        let accel = imu.read_accel().await.unwrap();
        assert_eq!(accel.x, 0.5);
        assert_eq!(accel.y, -0.5);
        assert_eq!(accel.z, 0.0);

        imu.set_accel_full_scale(AccelFullScale::G2).await.unwrap();
        imu.interface_mut().set_accel_raw([16384, 0, -16384]);
        let accel = imu.read_accel().await.unwrap();
        assert_eq!(accel.x, 1.0);
        assert_eq!(accel.z, -1.0);
    }

    #[futures_test::test]
    async fn test_read_gyro_scales_by_full_scale() {
        let mut imu = driver();
        imu.set_gyro_full_scale(GyroFullScale::Dps250).await.unwrap();
        imu.interface_mut().set_gyro_raw([1024, 0, -2048]);

        assert_eq!(imu.read_raw_gyro().await.unwrap(), [1024, 0, -2048]);
        let gyro = imu.read_gyro().await.unwrap();
        assert_eq!(gyro.x, 7.8125);
        assert_eq!(gyro.y, 0.0);
        assert_eq!(gyro.z, -15.625);
    }

    #[futures_test::test]
    async fn test_read_temperature() {
        let mut imu = driver();

        imu.interface_mut().set_temperature_raw(0);
        assert_eq!(imu.read_temperature().await.unwrap(), 25.0);

        imu.interface_mut().set_temperature_raw(1325);
        let temp = imu.read_temperature().await.unwrap();
        assert!(temp > 34.99 && temp < 35.01);
    }

    // ---------------------------------------------------------------------------
    // Calibration
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_calibrate_gyro_mean() {
        let mut imu = driver();
        imu.set_gyro_full_scale(GyroFullScale::Dps250).await.unwrap();
        imu.interface_mut().set_gyro_raw([1024, -1024, 0]);

        let bias = imu.calibrate_gyro().await.unwrap();
        assert_eq!(bias.x, 7.8125);
        assert_eq!(bias.y, -7.8125);
        assert_eq!(bias.z, 0.0);

        let expected = u64::from(CALIBRATION_SAMPLES) * u64::from(CALIBRATION_SAMPLE_DELAY_MS);
        assert_eq!(imu.delay().elapsed_ms(), expected);
    }

    #[futures_test::test]
    async fn test_calibrate_accel_and_gyro_removes_gravity() {
        let mut imu = driver();
        imu.interface_mut().set_accel_raw([0, 0, 16384]);
        imu.interface_mut().set_gyro_raw([128, 0, 0]);

        let bias = imu.calibrate_accel_and_gyro().await.unwrap();
        assert_eq!(bias.accel.x, 0.0);
        assert_eq!(bias.accel.y, 0.0);
        assert_eq!(bias.accel.z, 0.0);
        assert_eq!(bias.gyro.x, 128.0 * GYRO_SCALE_250DPS);

        let device = imu.interface();
        // ±2g / ±250dps at 200 Hz
        assert_eq!(bank1(device, Register::ACCEL_CONFIG0), 0x67);
        assert_eq!(bank1(device, Register::GYRO_CONFIG0), 0x67);
        // Sensors left off
        let pwr = pwr_mgmt0(device);
        assert_eq!(pwr.accel_mode(), AccelMode::Off);
        assert_eq!(pwr.gyro_mode(), GyroMode::Off);
    }

    #[futures_test::test]
    async fn test_calibrate_accel_and_gyro_upside_down() {
        let mut imu = driver();
        imu.interface_mut().set_accel_raw([0, 0, -8192]);

        let bias = imu.calibrate_accel_and_gyro().await.unwrap();
        assert_eq!(bias.accel.z, 0.5);
    }

    #[futures_test::test]
    async fn test_calibrate_accel_and_gyro_sample_count() {
        let mut imu = driver();

        imu.calibrate_accel_and_gyro().await.unwrap();

        let expected = u64::from(SENSOR_SETTLE_DELAY_MS)
            + u64::from(CALIBRATION_SAMPLES) * u64::from(CALIBRATION_SAMPLE_DELAY_MS);
        assert_eq!(imu.delay().elapsed_ms(), expected);
        // Scaling follows the forced calibration ranges
        assert_eq!(imu.active_config().accel_full_scale, AccelFullScale::G2);
        assert_eq!(imu.config().accel_full_scale, AccelFullScale::G16);
    }

    // ---------------------------------------------------------------------------
    // SPI transport
    // ---------------------------------------------------------------------------

    #[futures_test::test]
    async fn test_spi_read_framing() {
        let spi = FakeSpiBus::with_response(&[0x47]);
        let mut interface = spi_interface(spi);

        assert_eq!(interface.read_register(0x75).await.unwrap(), 0x47);

        let (spi, cs, delay) = interface.release();
        assert_eq!(spi.written.as_slice(), &[0xF5, 0x00]);
        assert_eq!(cs.levels.as_slice(), &[false, true]);
        assert!(spi.flushes >= 1);
        assert_eq!(delay.elapsed_ns, u64::from(CS_SETUP_US + CS_HOLD_US) * 1_000);
    }

    #[futures_test::test]
    async fn test_spi_write_framing() {
        let mut interface = spi_interface(FakeSpiBus::default());

        interface.write_register(0xCE, 0x0F).await.unwrap();

        let (spi, cs, _) = interface.release();
        assert_eq!(spi.written.as_slice(), &[0x4E, 0x0F]);
        assert_eq!(cs.levels.as_slice(), &[false, true]);
    }

    #[futures_test::test]
    async fn test_spi_select_bank_masks() {
        let mut interface = spi_interface(FakeSpiBus::default());

        interface.select_bank(0xFAu8).await.unwrap();
        interface.select_bank(Bank::Bank4).await.unwrap();

        let (spi, cs, _) = interface.release();
        assert_eq!(spi.written.as_slice(), &[0x76, 0x02, 0x76, 0x04]);
        assert!(cs.is_high());
    }

    #[futures_test::test]
    async fn test_spi_masked_write() {
        let spi = FakeSpiBus::with_response(&[0b1010_0101]);
        let mut interface = spi_interface(spi);

        interface.masked_write(0x65, 0xFF, 0x08).await.unwrap();

        let (spi, cs, _) = interface.release();
        assert_eq!(spi.written.as_slice(), &[0xE5, 0x00, 0x65, 0b1010_1101]);
        assert_eq!(cs.levels.as_slice(), &[false, true, false, true]);
    }
}
