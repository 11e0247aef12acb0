//! Error types for the gyroscope driver

use thiserror::Error;

use crate::gyroscope::Phase;

/// Invalid configuration handed to the driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `full_scale_select` is none of the three known CTRL_REG4 codes
    #[error("Unrecognized full-scale selection: 0x{0:02X} (expected 0x00, 0x10, 0x20 or 0x30)")]
    UnrecognizedFullScale(u8),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Transport-level failure on the SPI bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// FTDI driver error
    #[error("FTDI error: {status} ({description})")]
    Ftdi { status: u32, description: String },

    /// No SPI channels found
    #[error("No SPI channels found")]
    NoChannelsFound,

    /// Invalid channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Short transfer
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: u32, actual: u32 },

    /// Error reported by an embedded-hal SPI device
    #[error("SPI device error: {0}")]
    Hal(String),

    /// Failure injected by the simulated bus
    #[error("Simulated bus fault: {0}")]
    Simulated(String),
}

/// Operation not valid in the driver's current lifecycle phase
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// Sampling requested outside the active phase
    #[error("Gyroscope is not active (phase: {0:?})")]
    NotActive(Phase),

    /// No sensitivity has been selected yet
    #[error("Gyroscope has not been configured; run setup first")]
    NotConfigured,
}

/// Error type for gyroscope operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GyroError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Recording file could not be written or read
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for gyroscope operations
pub type Result<T> = std::result::Result<T, GyroError>;

#[cfg(feature = "ftdi")]
impl From<crate::ffi::FT_STATUS> for BusError {
    fn from(status: crate::ffi::FT_STATUS) -> Self {
        BusError::Ftdi {
            status,
            description: crate::ffi::status_to_string(status).to_string(),
        }
    }
}
