//! SPI bus transport
//!
//! Every method is one complete transaction framed by chip select: the line
//! is asserted before the first byte and released after the last, and no
//! other transaction can interleave.

use embedded_hal::spi::{Error as _, SpiDevice};
use log::{debug, warn};

use crate::error::BusError;
use crate::registers::FILLER;

/// SPI mode (Clock Polarity and Phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

/// Chip select line on the FT232H ADBUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    Adbus3,
    Adbus4,
    Adbus5,
    Adbus6,
    Adbus7,
}

/// Bus configuration, fixed for the lifetime of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    /// Bus frequency in Hz
    pub frequency: u32,
    /// Clock polarity / phase
    pub mode: SpiMode,
    /// Bits per frame
    pub frame_bits: u8,
    /// Chip select pin (always active low)
    pub chip_select: ChipSelect,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000, // 1 MHz
            mode: SpiMode::Mode3,
            frame_bits: 8,
            chip_select: ChipSelect::Adbus3,
        }
    }
}

/// Chip-select framed byte exchange with the gyroscope
pub trait SpiTransport {
    /// Apply frame width, clock mode and frequency
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError>;

    /// Full-duplex transfer of `write.len()` bytes in one framed transaction
    ///
    /// `read` must be the same length as `write`.
    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError>;

    /// Transmit `[address, value]` in one transaction
    fn write_register(&mut self, address: u8, value: u8) -> Result<(), BusError> {
        let mut discard = [0u8; 2];
        self.transfer(&[address, value], &mut discard)
    }

    /// Transmit `command` followed by filler bytes, collecting `data.len()` bytes
    ///
    /// The byte clocked in while the command goes out is discarded.
    fn read_burst(&mut self, command: u8, data: &mut [u8]) -> Result<(), BusError> {
        let mut tx = vec![FILLER; data.len() + 1];
        tx[0] = command;
        let mut rx = vec![0u8; tx.len()];
        self.transfer(&tx, &mut rx)?;
        data.copy_from_slice(&rx[1..]);
        Ok(())
    }
}

impl<T: SpiTransport + ?Sized> SpiTransport for &mut T {
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError> {
        (**self).configure(config)
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        (**self).transfer(write, read)
    }
}

impl<T: SpiTransport + ?Sized> SpiTransport for Box<T> {
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError> {
        (**self).configure(config)
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        (**self).transfer(write, read)
    }
}

/// Transport over any embedded-hal 1.0 [`SpiDevice`]
///
/// The device owns chip select and its bus settings are fixed when it is
/// built, so `configure` only records the requested settings.
pub struct HalSpi<S> {
    device: S,
    config: Option<SpiConfig>,
}

impl<S: SpiDevice> HalSpi<S> {
    pub fn new(device: S) -> Self {
        Self { device, config: None }
    }

    /// Settings last passed to `configure`
    pub fn config(&self) -> Option<&SpiConfig> {
        self.config.as_ref()
    }

    pub fn destroy(self) -> S {
        self.device
    }
}

impl<S: SpiDevice> SpiTransport for HalSpi<S> {
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError> {
        if config.frame_bits != 8 {
            warn!(
                "SpiDevice transfers are 8-bit; requested {}-bit frames ignored",
                config.frame_bits
            );
        }
        debug!(
            "HalSpi: bus settings fixed by device ({:?}, {} Hz requested)",
            config.mode, config.frequency
        );
        self.config = Some(*config);
        Ok(())
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        if write.len() != read.len() {
            return Err(BusError::TransferError {
                expected: write.len() as u32,
                actual: read.len() as u32,
            });
        }
        self.device
            .transfer(read, write)
            .map_err(|e| BusError::Hal(format!("{:?}", e.kind())))
    }
}
