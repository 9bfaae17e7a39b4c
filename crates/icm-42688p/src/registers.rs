use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Expected WHO_AM_I value of the ICM-42688-P.
pub const WHO_AM_I_VALUE: u8 = 0x47;

/// Only bits 2:0 of REG_BANK_SEL are implemented.
pub const BANK_SEL_MASK: u8 = 0x07;

/// Bank holding GYRO_CONFIG0 and ACCEL_CONFIG0.
///
/// Full-scale, ODR and resolution accesses all go through this bank so
/// that a value written by one is what the others read back.
pub const SENSOR_CONFIG_BANK: Bank = Bank::Bank1;

// Accelerometer resolution in g/LSB.
pub const ACCEL_SCALE_2G: f32 = 2.0 / 32768.0;
pub const ACCEL_SCALE_4G: f32 = 4.0 / 32768.0;
pub const ACCEL_SCALE_8G: f32 = 8.0 / 32768.0;
pub const ACCEL_SCALE_16G: f32 = 16.0 / 32768.0;

// Gyroscope resolution in dps/LSB.
pub const GYRO_SCALE_2000DPS: f32 = 2000.0 / 32768.0;
pub const GYRO_SCALE_1000DPS: f32 = 1000.0 / 32768.0;
pub const GYRO_SCALE_500DPS: f32 = 500.0 / 32768.0;
pub const GYRO_SCALE_250DPS: f32 = 250.0 / 32768.0;
pub const GYRO_SCALE_125DPS: f32 = 125.0 / 32768.0;
pub const GYRO_SCALE_62_5DPS: f32 = 62.5 / 32768.0;
pub const GYRO_SCALE_31_25DPS: f32 = 31.25 / 32768.0;
pub const GYRO_SCALE_15_625DPS: f32 = 15.625 / 32768.0;

/// Register banks used by the driver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Bank {
    Bank0 = 0,
    Bank1 = 1,
    Bank2 = 2,
    Bank4 = 4,
}

///
/// Registers touched by the driver
///
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Soft reset
    DEVICE_CONFIG = 0x11,
    /// INT1/INT2 polarity, drive circuit and mode
    INT_CONFIG = 0x14,
    /// Temperature data, high byte first
    TEMP_DATA1 = 0x1D,
    /// First of six accelerometer data registers (X1, X0, Y1, Y0, Z1, Z0)
    ACCEL_DATA_X1 = 0x1F,
    /// First of six gyroscope data registers (X1, X0, Y1, Y0, Z1, Z0)
    GYRO_DATA_X1 = 0x25,
    /// Interrupt status, cleared on read
    INT_STATUS = 0x2D,
    /// Serial interface configuration
    INTF_CONFIG0 = 0x4C,
    /// Sensor power modes
    PWR_MGMT0 = 0x4E,
    /// Gyroscope full-scale and ODR
    GYRO_CONFIG0 = 0x4F,
    /// Accelerometer full-scale and ODR
    ACCEL_CONFIG0 = 0x50,
    /// Interrupt sources routed to INT1
    INT_SOURCE0 = 0x65,
    /// Device identity
    WHO_AM_I = 0x75,
    /// Bank select, present in every bank
    REG_BANK_SEL = 0x76,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }

    pub const fn bank(self) -> Bank {
        match self {
            Self::GYRO_CONFIG0 | Self::ACCEL_CONFIG0 => SENSOR_CONFIG_BANK,
            _ => Bank::Bank0,
        }
    }

    /// Power-on value of the register.
    pub const fn reset_value(self) -> u8 {
        match self {
            Self::GYRO_CONFIG0 | Self::ACCEL_CONFIG0 => 0x06,
            Self::INT_SOURCE0 => 0x10,
            Self::INTF_CONFIG0 => 0x30,
            Self::WHO_AM_I => WHO_AM_I_VALUE,
            _ => 0x00,
        }
    }
}

/// Accelerometer full-scale range, encoded as ACCEL_FS_SEL.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelFullScale {
    /// ±16g
    G16 = 0,
    /// ±8g
    G8 = 1,
    /// ±4g
    G4 = 2,
    /// ±2g
    G2 = 3,
}

impl AccelFullScale {
    pub const ALL: [Self; 4] = [Self::G16, Self::G8, Self::G4, Self::G2];

    /// Decodes a 3-bit ACCEL_FS_SEL code. Unknown codes fall back to ±16g.
    pub fn from_code(code: u8) -> Self {
        Self::try_from(code).unwrap_or(Self::G16)
    }

    /// Resolution in g/LSB.
    pub const fn resolution(self) -> f32 {
        match self {
            Self::G2 => ACCEL_SCALE_2G,
            Self::G4 => ACCEL_SCALE_4G,
            Self::G8 => ACCEL_SCALE_8G,
            Self::G16 => ACCEL_SCALE_16G,
        }
    }
}

/// Gyroscope full-scale range, encoded as GYRO_FS_SEL.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroFullScale {
    Dps2000 = 0,
    Dps1000 = 1,
    Dps500 = 2,
    Dps250 = 3,
    Dps125 = 4,
    Dps62_5 = 5,
    Dps31_25 = 6,
    Dps15_625 = 7,
}

impl GyroFullScale {
    pub const ALL: [Self; 8] = [
        Self::Dps2000,
        Self::Dps1000,
        Self::Dps500,
        Self::Dps250,
        Self::Dps125,
        Self::Dps62_5,
        Self::Dps31_25,
        Self::Dps15_625,
    ];

    /// Decodes a 3-bit GYRO_FS_SEL code. Unknown codes fall back to ±2000dps.
    pub fn from_code(code: u8) -> Self {
        Self::try_from(code).unwrap_or(Self::Dps2000)
    }

    /// Resolution in dps/LSB.
    pub const fn resolution(self) -> f32 {
        match self {
            Self::Dps2000 => GYRO_SCALE_2000DPS,
            Self::Dps1000 => GYRO_SCALE_1000DPS,
            Self::Dps500 => GYRO_SCALE_500DPS,
            Self::Dps250 => GYRO_SCALE_250DPS,
            Self::Dps125 => GYRO_SCALE_125DPS,
            Self::Dps62_5 => GYRO_SCALE_62_5DPS,
            Self::Dps31_25 => GYRO_SCALE_31_25DPS,
            Self::Dps15_625 => GYRO_SCALE_15_625DPS,
        }
    }
}

/// Output data rate codes shared by ACCEL_ODR and GYRO_ODR.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OutputDataRate {
    Odr32kHz = 0x01,
    Odr16kHz = 0x02,
    Odr8kHz = 0x03,
    Odr4kHz = 0x04,
    Odr2kHz = 0x05,
    Odr1kHz = 0x06,
    Odr200Hz = 0x07,
    Odr100Hz = 0x08,
    Odr50Hz = 0x09,
    Odr25Hz = 0x0A,
    Odr12_5Hz = 0x0B,
    Odr6_25Hz = 0x0C,
    Odr3_125Hz = 0x0D,
    Odr1_5625Hz = 0x0E,
    Odr500Hz = 0x0F,
}

impl OutputDataRate {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn hz(self) -> f32 {
        match self {
            Self::Odr32kHz => 32_000.0,
            Self::Odr16kHz => 16_000.0,
            Self::Odr8kHz => 8_000.0,
            Self::Odr4kHz => 4_000.0,
            Self::Odr2kHz => 2_000.0,
            Self::Odr1kHz => 1_000.0,
            Self::Odr200Hz => 200.0,
            Self::Odr100Hz => 100.0,
            Self::Odr50Hz => 50.0,
            Self::Odr25Hz => 25.0,
            Self::Odr12_5Hz => 12.5,
            Self::Odr6_25Hz => 6.25,
            Self::Odr3_125Hz => 3.125,
            Self::Odr1_5625Hz => 1.5625,
            Self::Odr500Hz => 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelMode {
    Off = 0b00,
    LowPower = 0b10,
    LowNoise = 0b11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroMode {
    Off = 0b00,
    Standby = 0b01,
    LowNoise = 0b11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Int1Polarity {
    ActiveLow,
    ActiveHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Int1Drive {
    OpenDrain,
    PushPull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Int1Mode {
    Pulsed,
    Latched,
}

bitflags! {
    /// DEVICE_CONFIG
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DeviceConfigReg: u8 {
        const SPI_MODE          = 0b0001_0000;
        const SOFT_RESET_CONFIG = 0b0000_0001;
    }
}

bitflags! {
    /// INTF_CONFIG0
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IntfConfig0: u8 {
        const FIFO_COUNT_ENDIAN  = 0b0010_0000;
        const SENSOR_DATA_ENDIAN = 0b0001_0000;
        const UI_SIFS_CFG1       = 0b0000_0010;
        const UI_SIFS_CFG0       = 0b0000_0001;

        /// Disables the I2C/I3C side of the serial interface.
        const UI_SIFS_CFG_I2C_DISABLE = Self::UI_SIFS_CFG1.bits() | Self::UI_SIFS_CFG0.bits();
    }
}

bitflags! {
    /// PWR_MGMT0
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PwrMgmt0: u8 {
        const TEMP_DIS    = 0b0010_0000;
        const IDLE        = 0b0001_0000;
        const GYRO_MODE1  = 0b0000_1000;
        const GYRO_MODE0  = 0b0000_0100;
        const ACCEL_MODE1 = 0b0000_0010;
        const ACCEL_MODE0 = 0b0000_0001;

        const GYRO_MODE = Self::GYRO_MODE1.bits() | Self::GYRO_MODE0.bits();
        const ACCEL_MODE = Self::ACCEL_MODE1.bits() | Self::ACCEL_MODE0.bits();
    }
}

const GYRO_MODE_SHIFT: u8 = 2;

const _: () = assert!(
    PwrMgmt0::GYRO_MODE.bits() & PwrMgmt0::ACCEL_MODE.bits() == 0,
    "accel and gyro mode fields must not overlap"
);

impl Default for PwrMgmt0 {
    fn default() -> Self {
        Self::empty()
    }
}

impl PwrMgmt0 {
    /// Both `0b00` and `0b01` mean off.
    pub const fn accel_mode(&self) -> AccelMode {
        match self.intersection(Self::ACCEL_MODE).bits() {
            0b10 => AccelMode::LowPower,
            0b11 => AccelMode::LowNoise,
            _ => AccelMode::Off,
        }
    }

    pub const fn with_accel_mode(self, mode: AccelMode) -> Self {
        self.difference(Self::ACCEL_MODE)
            .union(Self::from_bits_retain(mode as u8).intersection(Self::ACCEL_MODE))
    }

    /// The reserved `0b10` encoding reads as off.
    pub const fn gyro_mode(&self) -> GyroMode {
        match self.intersection(Self::GYRO_MODE).bits() >> GYRO_MODE_SHIFT {
            0b01 => GyroMode::Standby,
            0b11 => GyroMode::LowNoise,
            _ => GyroMode::Off,
        }
    }

    pub const fn with_gyro_mode(self, mode: GyroMode) -> Self {
        self.difference(Self::GYRO_MODE).union(
            Self::from_bits_retain((mode as u8) << GYRO_MODE_SHIFT)
                .intersection(Self::GYRO_MODE),
        )
    }

    pub const fn temp_disabled(&self) -> bool {
        self.contains(Self::TEMP_DIS)
    }

    pub const fn with_temp_disabled(self, disabled: bool) -> Self {
        let reg = self.difference(Self::TEMP_DIS);
        match disabled {
            false => reg,
            true => reg.union(Self::TEMP_DIS),
        }
    }
}

const FS_SEL_SHIFT: u8 = 5;

bitflags! {
    /// GYRO_CONFIG0
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct GyroConfig0: u8 {
        const GYRO_FS_SEL2 = 0b1000_0000;
        const GYRO_FS_SEL1 = 0b0100_0000;
        const GYRO_FS_SEL0 = 0b0010_0000;
        const GYRO_ODR3    = 0b0000_1000;
        const GYRO_ODR2    = 0b0000_0100;
        const GYRO_ODR1    = 0b0000_0010;
        const GYRO_ODR0    = 0b0000_0001;

        const GYRO_FS_SEL = Self::GYRO_FS_SEL2.bits() | Self::GYRO_FS_SEL1.bits() | Self::GYRO_FS_SEL0.bits();
        const GYRO_ODR = Self::GYRO_ODR3.bits() | Self::GYRO_ODR2.bits() | Self::GYRO_ODR1.bits() | Self::GYRO_ODR0.bits();
    }
}

impl Default for GyroConfig0 {
    fn default() -> Self {
        Self::from_bits_retain(Register::GYRO_CONFIG0.reset_value())
    }
}

impl GyroConfig0 {
    pub const fn fs_code(&self) -> u8 {
        self.intersection(Self::GYRO_FS_SEL).bits() >> FS_SEL_SHIFT
    }

    pub fn full_scale(&self) -> GyroFullScale {
        GyroFullScale::from_code(self.fs_code())
    }

    pub const fn with_full_scale(self, fs: GyroFullScale) -> Self {
        self.difference(Self::GYRO_FS_SEL).union(
            Self::from_bits_retain((fs as u8) << FS_SEL_SHIFT)
                .intersection(Self::GYRO_FS_SEL),
        )
    }

    pub const fn odr_code(&self) -> u8 {
        self.intersection(Self::GYRO_ODR).bits()
    }

    /// Only the low nibble of `code` is used; bits 7:4 are preserved.
    pub const fn with_odr_code(self, code: u8) -> Self {
        self.difference(Self::GYRO_ODR)
            .union(Self::from_bits_retain(code).intersection(Self::GYRO_ODR))
    }

    pub fn odr(&self) -> Option<OutputDataRate> {
        OutputDataRate::try_from(self.odr_code()).ok()
    }

    pub const fn with_odr(self, odr: OutputDataRate) -> Self {
        self.with_odr_code(odr.code())
    }
}

bitflags! {
    /// ACCEL_CONFIG0
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct AccelConfig0: u8 {
        const ACCEL_FS_SEL2 = 0b1000_0000;
        const ACCEL_FS_SEL1 = 0b0100_0000;
        const ACCEL_FS_SEL0 = 0b0010_0000;
        const ACCEL_ODR3    = 0b0000_1000;
        const ACCEL_ODR2    = 0b0000_0100;
        const ACCEL_ODR1    = 0b0000_0010;
        const ACCEL_ODR0    = 0b0000_0001;

        const ACCEL_FS_SEL = Self::ACCEL_FS_SEL2.bits() | Self::ACCEL_FS_SEL1.bits() | Self::ACCEL_FS_SEL0.bits();
        const ACCEL_ODR = Self::ACCEL_ODR3.bits() | Self::ACCEL_ODR2.bits() | Self::ACCEL_ODR1.bits() | Self::ACCEL_ODR0.bits();
    }
}

impl Default for AccelConfig0 {
    fn default() -> Self {
        Self::from_bits_retain(Register::ACCEL_CONFIG0.reset_value())
    }
}

impl AccelConfig0 {
    pub const fn fs_code(&self) -> u8 {
        self.intersection(Self::ACCEL_FS_SEL).bits() >> FS_SEL_SHIFT
    }

    pub fn full_scale(&self) -> AccelFullScale {
        AccelFullScale::from_code(self.fs_code())
    }

    pub const fn with_full_scale(self, fs: AccelFullScale) -> Self {
        self.difference(Self::ACCEL_FS_SEL).union(
            Self::from_bits_retain((fs as u8) << FS_SEL_SHIFT)
                .intersection(Self::ACCEL_FS_SEL),
        )
    }

    pub const fn odr_code(&self) -> u8 {
        self.intersection(Self::ACCEL_ODR).bits()
    }

    /// Only the low nibble of `code` is used; bits 7:4 are preserved.
    pub const fn with_odr_code(self, code: u8) -> Self {
        self.difference(Self::ACCEL_ODR)
            .union(Self::from_bits_retain(code).intersection(Self::ACCEL_ODR))
    }

    pub fn odr(&self) -> Option<OutputDataRate> {
        OutputDataRate::try_from(self.odr_code()).ok()
    }

    pub const fn with_odr(self, odr: OutputDataRate) -> Self {
        self.with_odr_code(odr.code())
    }
}

bitflags! {
    /// INT_CONFIG
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IntConfig: u8 {
        const INT2_MODE          = 0b0010_0000;
        const INT2_DRIVE_CIRCUIT = 0b0001_0000;
        const INT2_POLARITY      = 0b0000_1000;
        const INT1_MODE          = 0b0000_0100;
        const INT1_DRIVE_CIRCUIT = 0b0000_0010;
        const INT1_POLARITY      = 0b0000_0001;
    }
}

impl IntConfig {
    pub const fn int1_polarity(&self) -> Int1Polarity {
        match self.contains(Self::INT1_POLARITY) {
            false => Int1Polarity::ActiveLow,
            true => Int1Polarity::ActiveHigh,
        }
    }

    pub const fn with_int1_polarity(self, polarity: Int1Polarity) -> Self {
        let reg = self.difference(Self::INT1_POLARITY);
        match polarity {
            Int1Polarity::ActiveLow => reg,
            Int1Polarity::ActiveHigh => reg.union(Self::INT1_POLARITY),
        }
    }

    pub const fn int1_drive(&self) -> Int1Drive {
        match self.contains(Self::INT1_DRIVE_CIRCUIT) {
            false => Int1Drive::OpenDrain,
            true => Int1Drive::PushPull,
        }
    }

    pub const fn with_int1_drive(self, drive: Int1Drive) -> Self {
        let reg = self.difference(Self::INT1_DRIVE_CIRCUIT);
        match drive {
            Int1Drive::OpenDrain => reg,
            Int1Drive::PushPull => reg.union(Self::INT1_DRIVE_CIRCUIT),
        }
    }

    pub const fn int1_mode(&self) -> Int1Mode {
        match self.contains(Self::INT1_MODE) {
            false => Int1Mode::Pulsed,
            true => Int1Mode::Latched,
        }
    }

    pub const fn with_int1_mode(self, mode: Int1Mode) -> Self {
        let reg = self.difference(Self::INT1_MODE);
        match mode {
            Int1Mode::Pulsed => reg,
            Int1Mode::Latched => reg.union(Self::INT1_MODE),
        }
    }
}

bitflags! {
    /// INT_SOURCE0
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IntSource0: u8 {
        const UI_FSYNC_INT1_EN   = 0b0100_0000;
        const PLL_RDY_INT1_EN    = 0b0010_0000;
        const RESET_DONE_INT1_EN = 0b0001_0000;
        const UI_DRDY_INT1_EN    = 0b0000_1000;
        const FIFO_THS_INT1_EN   = 0b0000_0100;
        const FIFO_FULL_INT1_EN  = 0b0000_0010;
        const UI_AGC_RDY_INT1_EN = 0b0000_0001;
    }
}

impl IntSource0 {
    pub const fn ui_drdy_int1_en(&self) -> bool {
        self.contains(Self::UI_DRDY_INT1_EN)
    }

    pub const fn with_ui_drdy_int1_en(self, en: bool) -> Self {
        let reg = self.difference(Self::UI_DRDY_INT1_EN);
        match en {
            false => reg,
            true => reg.union(Self::UI_DRDY_INT1_EN),
        }
    }
}

bitflags! {
    /// INT_STATUS
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IntStatus: u8 {
        const UI_FSYNC_INT   = 0b0100_0000;
        const PLL_RDY_INT    = 0b0010_0000;
        const RESET_DONE_INT = 0b0001_0000;
        const DATA_RDY_INT   = 0b0000_1000;
        const FIFO_THS_INT   = 0b0000_0100;
        const FIFO_FULL_INT  = 0b0000_0010;
        const AGC_RDY_INT    = 0b0000_0001;
    }
}

impl IntStatus {
    pub const fn data_ready(&self) -> bool {
        self.contains(Self::DATA_RDY_INT)
    }
}
