//! Lifecycle-managed IMU built on the ICM-42688-P driver.
//!
//! [`Imu`] gates sample access on its [`ImuState`]: acceleration and
//! angular rate are only read from the device once [`Imu::configure`] has
//! brought it to [`ImuState::Ready`].
#![no_std]

#[macro_use]
mod fmt;

pub use icm_42688p::{
    AccelFullScale, Error, F32x3, GyroFullScale, Icm42688p, OutputDataRate, RegisterInterface,
};

use embedded_hal_async::delay::DelayNs;
use icm_42688p::SENSOR_SETTLE_DELAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImuState {
    #[default]
    Disabled,
    Initializing,
    Calibrating,
    Ready,
}

/// Sensor settings applied by [`Imu::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuConfig {
    pub accel_full_scale: AccelFullScale,
    pub gyro_full_scale: GyroFullScale,
    pub accel_bandwidth: OutputDataRate,
    pub gyro_bandwidth: OutputDataRate,
}

impl Default for ImuConfig {
    /// ±2g and ±250dps, accelerometer at 1 kHz and gyroscope at 200 Hz.
    fn default() -> Self {
        Self {
            accel_full_scale: AccelFullScale::G2,
            gyro_full_scale: GyroFullScale::Dps250,
            accel_bandwidth: OutputDataRate::Odr1kHz,
            gyro_bandwidth: OutputDataRate::Odr200Hz,
        }
    }
}

/// Counters kept by [`Imu::is_data_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataReadyStats {
    /// Polls made while ready
    pub queries: u32,
    /// Polls that found new data
    pub ready: u32,
}

pub struct Imu<I, D> {
    driver: Icm42688p<I, D>,
    config: ImuConfig,
    state: ImuState,
    sample_rate: f32,
    gyro_bias: F32x3,
    stats: DataReadyStats,
}

impl<I, D> Imu<I, D>
where
    I: RegisterInterface,
    D: DelayNs,
{
    pub fn new(driver: Icm42688p<I, D>) -> Self {
        Self::new_with_config(driver, ImuConfig::default())
    }

    pub fn new_with_config(driver: Icm42688p<I, D>, config: ImuConfig) -> Self {
        Self {
            driver,
            config,
            state: ImuState::Disabled,
            sample_rate: 0.0,
            gyro_bias: F32x3::default(),
            stats: DataReadyStats::default(),
        }
    }

    pub fn state(&self) -> ImuState {
        self.state
    }

    /// Rate applied by the last successful [`Self::configure`], in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Gyroscope offset measured by the last [`Self::init`], in dps.
    ///
    /// It is not subtracted from [`Self::get_gyro`].
    pub fn gyro_bias(&self) -> F32x3 {
        self.gyro_bias
    }

    pub fn data_ready_stats(&self) -> DataReadyStats {
        self.stats
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    pub fn driver(&self) -> &Icm42688p<I, D> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Icm42688p<I, D> {
        &mut self.driver
    }

    pub fn release(self) -> Icm42688p<I, D> {
        self.driver
    }

    /// Brings the device up and measures the gyroscope bias.
    ///
    /// Leaves the IMU in [`ImuState::Initializing`]; call [`Self::configure`]
    /// to start sampling. On failure the device is powered down and the
    /// state is [`ImuState::Disabled`].
    pub async fn init(&mut self) -> Result<(), Error<I::Error>> {
        self.set_state(ImuState::Initializing);

        match self.bring_up().await {
            Ok(()) => {
                self.set_state(ImuState::Initializing);
                Ok(())
            }
            Err(e) => {
                warn!("IMU bring-up failed, powering down");
                let _ = self.driver.deinit().await;
                self.set_state(ImuState::Disabled);
                Err(e)
            }
        }
    }

    async fn bring_up(&mut self) -> Result<(), Error<I::Error>> {
        self.driver.init().await?;
        let id = self.driver.device_id().await?;
        debug!("IMU device id {=u8:#x}", id);

        self.set_state(ImuState::Calibrating);
        self.gyro_bias = self.driver.calibrate_gyro().await?;
        Ok(())
    }

    pub async fn deinit(&mut self) -> Result<(), Error<I::Error>> {
        self.set_state(ImuState::Disabled);
        self.driver.deinit().await
    }

    /// Starts sampling at the closest supported rate and returns it.
    ///
    /// This is the only way to reach [`ImuState::Ready`]. If a register
    /// access fails the state stays [`ImuState::Initializing`].
    pub async fn configure(&mut self, sample_rate: f32) -> Result<f32, Error<I::Error>> {
        self.set_state(ImuState::Initializing);

        self.driver.enable_sensors(true, true, false).await?;
        let applied = self.driver.set_sample_rate(sample_rate).await?;
        self.sample_rate = applied;

        let ImuConfig {
            accel_full_scale,
            gyro_full_scale,
            accel_bandwidth,
            gyro_bandwidth,
        } = self.config;
        self.driver.set_accel_full_scale(accel_full_scale).await?;
        self.driver.set_gyro_full_scale(gyro_full_scale).await?;

        if accel_bandwidth != gyro_bandwidth {
            warn!(
                "Accel bandwidth {} Hz differs from gyro bandwidth {} Hz",
                accel_bandwidth.hz(),
                gyro_bandwidth.hz()
            );
        }
        self.driver.set_accel_odr(accel_bandwidth).await?;
        self.driver.set_gyro_odr(gyro_bandwidth).await?;
        self.driver.delay_ms(SENSOR_SETTLE_DELAY_MS).await;

        self.driver.enable_interrupt(true).await?;
        // Drop anything latched before the interrupt was routed
        self.driver.read_interrupt_status().await?;

        self.set_state(ImuState::Ready);
        Ok(applied)
    }

    /// Acceleration in g, or zero unless ready.
    pub async fn get_acceleration(&mut self) -> Result<F32x3, Error<I::Error>> {
        if self.state != ImuState::Ready {
            return Ok(F32x3::default());
        }
        self.driver.read_accel().await
    }

    /// Angular rate in dps, or zero unless ready.
    pub async fn get_gyro(&mut self) -> Result<F32x3, Error<I::Error>> {
        if self.state != ImuState::Ready {
            return Ok(F32x3::default());
        }
        self.driver.read_gyro().await
    }

    /// Full reset and recalibration, then reconfiguration at the last
    /// applied sample rate. Returns the new gyroscope bias.
    pub async fn calibrate_gyro(&mut self) -> Result<F32x3, Error<I::Error>> {
        self.driver.enable_interrupt(false).await?;
        self.deinit().await?;
        self.init().await?;
        self.configure(self.sample_rate).await?;
        Ok(self.gyro_bias)
    }

    /// Polls the data-ready flag. Always `false` unless ready.
    pub async fn is_data_ready(&mut self) -> Result<bool, Error<I::Error>> {
        if self.state != ImuState::Ready {
            return Ok(false);
        }

        self.stats.queries = self.stats.queries.wrapping_add(1);
        let ready = self.driver.is_data_ready().await?;
        if ready {
            self.stats.ready = self.stats.ready.wrapping_add(1);
        }
        Ok(ready)
    }

    fn set_state(&mut self, state: ImuState) {
        if self.state != state {
            debug!("IMU state {} -> {}", self.state, state);
        }
        self.state = state;
    }
}
