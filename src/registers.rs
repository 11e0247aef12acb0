//! Register map and command encoding for the L3GD20 / I3G4250D rate gyroscope
//!
//! All bit-level knowledge of the SPI protocol lives here: register
//! addresses, CTRL_REG1 power bits, the read / auto-increment command bits
//! and the little-endian burst decode.

use bitflags::bitflags;

use crate::error::ConfigError;
use crate::types::RawSample;

/// Read bit of the SPI command byte
pub const READ: u8 = 0x80;
/// Address auto-increment bit of the SPI command byte
pub const AUTO_INCREMENT: u8 = 0x40;
/// Byte clocked out while reading
pub const FILLER: u8 = 0xFF;

/// Number of rate axes in a burst
pub const AXIS_COUNT: usize = 3;
/// Data bytes returned by a full burst read
pub const BURST_LEN: usize = 2 * AXIS_COUNT;

/// Expected WHO_AM_I values
pub const WHO_AM_I_I3G4250D: u8 = 0xD3;
pub const WHO_AM_I_L3GD20: u8 = 0xD4;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    WhoAmI = 0x0F,
    /// Output data rate, bandwidth, power mode and axis enables
    CtrlReg1 = 0x20,
    /// Interrupt and data-ready routing
    CtrlReg3 = 0x22,
    /// Full-scale selection and data format
    CtrlReg4 = 0x23,
    /// First of six auto-incrementing data output registers
    OutXL = 0x28,
}

impl Register {
    pub fn addr(self) -> u8 {
        self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Register::WhoAmI => "WHO_AM_I",
            Register::CtrlReg1 => "CTRL_REG1",
            Register::CtrlReg3 => "CTRL_REG3",
            Register::CtrlReg4 => "CTRL_REG4",
            Register::OutXL => "OUT_X_L",
        }
    }
}

impl From<Register> for u8 {
    fn from(r: Register) -> u8 {
        r as u8
    }
}

bitflags! {
    /// CTRL_REG1 power and axis-enable bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl1: u8 {
        const XEN = 0b0000_0001;
        const YEN = 0b0000_0010;
        const ZEN = 0b0000_0100;
        /// Normal mode (power-down when cleared)
        const PD  = 0b0000_1000;
    }
}

impl Ctrl1 {
    /// Normal mode with all three axes enabled
    pub const POWER_ON: Ctrl1 = Ctrl1::all();
}

/// CTRL_REG1 value that powers the sensor down
pub const POWER_OFF: u8 = 0x00;

/// Full-scale range selected by CTRL_REG4 bits FS1..FS0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullScale {
    Dps245,
    Dps500,
    Dps2000,
}

impl FullScale {
    /// Sensitivity in degrees per second per LSB
    pub fn sensitivity(self) -> f32 {
        match self {
            FullScale::Dps245 => 0.008_75,
            FullScale::Dps500 => 0.017_5,
            FullScale::Dps2000 => 0.07,
        }
    }

    /// Measurement range in degrees per second
    pub fn range_dps(self) -> f32 {
        match self {
            FullScale::Dps245 => 245.0,
            FullScale::Dps500 => 500.0,
            FullScale::Dps2000 => 2000.0,
        }
    }

    /// Canonical CTRL_REG4 code
    pub fn code(self) -> u8 {
        match self {
            FullScale::Dps245 => 0x00,
            FullScale::Dps500 => 0x10,
            FullScale::Dps2000 => 0x20,
        }
    }

    /// Resolve a CTRL_REG4 full-scale code
    ///
    /// `0x30` is the datasheet's alternate encoding of the 2000 dps range.
    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        match code {
            0x00 => Ok(FullScale::Dps245),
            0x10 => Ok(FullScale::Dps500),
            0x20 | 0x30 => Ok(FullScale::Dps2000),
            other => Err(ConfigError::UnrecognizedFullScale(other)),
        }
    }

    /// Pick the full-scale range from its nominal dps value (245, 500 or 2000)
    pub fn from_dps(dps: u16) -> Option<Self> {
        match dps {
            245 | 250 => Some(FullScale::Dps245),
            500 => Some(FullScale::Dps500),
            2000 => Some(FullScale::Dps2000),
            _ => None,
        }
    }
}

/// Command byte for a multi-byte read starting at `start`
pub fn burst_read_command(start: Register) -> u8 {
    start.addr() | READ | AUTO_INCREMENT
}

/// Command byte for a single-register read
pub fn single_read_command(reg: Register) -> u8 {
    reg.addr() | READ
}

/// Decode the six data bytes of an OUT_X_L burst
///
/// Each axis is low byte first, two's complement; axes arrive X, Y, Z.
pub fn decode_burst(bytes: &[u8; BURST_LEN]) -> RawSample {
    RawSample {
        x: i16::from_le_bytes([bytes[0], bytes[1]]),
        y: i16::from_le_bytes([bytes[2], bytes[3]]),
        z: i16::from_le_bytes([bytes[4], bytes[5]]),
    }
}

/// Inverse of [`decode_burst`], used by the simulated bus
pub fn encode_burst(sample: RawSample) -> [u8; BURST_LEN] {
    let [xl, xh] = sample.x.to_le_bytes();
    let [yl, yh] = sample.y.to_le_bytes();
    let [zl, zh] = sample.z.to_le_bytes();
    [xl, xh, yl, yh, zl, zh]
}
