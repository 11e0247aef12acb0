//! SPI transport over an FT232H using FTDI libMPSSE

use crate::error::BusError;
use crate::ffi::*;
use crate::transport::{ChipSelect, SpiConfig, SpiMode, SpiTransport};
use log::{debug, info};
use std::ptr;

fn check(status: FT_STATUS) -> Result<(), BusError> {
    if status == FT_OK {
        Ok(())
    } else {
        Err(status.into())
    }
}

fn config_options(config: &SpiConfig) -> DWORD {
    let mode = match config.mode {
        SpiMode::Mode0 => SPI_CONFIG_OPTION_MODE0,
        SpiMode::Mode1 => SPI_CONFIG_OPTION_MODE1,
        SpiMode::Mode2 => SPI_CONFIG_OPTION_MODE2,
        SpiMode::Mode3 => SPI_CONFIG_OPTION_MODE3,
    };
    let cs = match config.chip_select {
        ChipSelect::Adbus3 => SPI_CONFIG_OPTION_CS_DBUS3,
        ChipSelect::Adbus4 => SPI_CONFIG_OPTION_CS_DBUS4,
        ChipSelect::Adbus5 => SPI_CONFIG_OPTION_CS_DBUS5,
        ChipSelect::Adbus6 => SPI_CONFIG_OPTION_CS_DBUS6,
        ChipSelect::Adbus7 => SPI_CONFIG_OPTION_CS_DBUS7,
    };
    mode | cs | SPI_CONFIG_OPTION_CS_ACTIVELOW
}

/// FT232H SPI channel
pub struct Ft232hSpi {
    handle: FT_HANDLE,
    channel: u32,
}

// The handle is only ever used through `&mut self`
unsafe impl Send for Ft232hSpi {}

impl Ft232hSpi {
    /// Open an SPI channel of the FT232H
    ///
    /// # Arguments
    /// * `channel_index` - Index of the SPI channel to use (usually 0)
    ///
    /// The channel is opened but not initialized; `configure` sets clock
    /// rate and mode.
    pub fn open(channel_index: u32) -> Result<Self, BusError> {
        let mut num_channels: DWORD = 0;
        check(unsafe { SPI_GetNumChannels(&mut num_channels) })?;

        if num_channels == 0 {
            return Err(BusError::NoChannelsFound);
        }

        if channel_index >= num_channels {
            return Err(BusError::InvalidChannel(channel_index));
        }

        let mut handle: FT_HANDLE = ptr::null_mut();
        check(unsafe { SPI_OpenChannel(channel_index, &mut handle) })?;

        info!("Opened FT232H SPI channel {} of {}", channel_index, num_channels);

        Ok(Self {
            handle,
            channel: channel_index,
        })
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }
}

impl SpiTransport for Ft232hSpi {
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError> {
        if config.frame_bits != 8 {
            return Err(BusError::Ftdi {
                status: FT_INVALID_PARAMETER,
                description: format!("{}-bit frames not supported, MPSSE SPI is 8-bit", config.frame_bits),
            });
        }

        let mut channel_config = ChannelConfig {
            ClockRate: config.frequency,
            configOptions: config_options(config),
            ..ChannelConfig::default()
        };

        check(unsafe { SPI_InitChannel(self.handle, &mut channel_config) })?;
        debug!(
            "SPI channel {} initialized: {} Hz, {:?}, CS {:?} active low",
            self.channel, config.frequency, config.mode, config.chip_select
        );
        Ok(())
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        if write.len() != read.len() {
            return Err(BusError::TransferError {
                expected: write.len() as u32,
                actual: read.len() as u32,
            });
        }

        let mut transferred: DWORD = 0;
        // CS asserted before the first byte and released after the last
        let options = SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES
            | SPI_TRANSFER_OPTIONS_CHIPSELECT_ENABLE
            | SPI_TRANSFER_OPTIONS_CHIPSELECT_DISABLE;

        check(unsafe {
            SPI_ReadWrite(
                self.handle,
                read.as_mut_ptr(),
                write.as_ptr(),
                write.len() as DWORD,
                &mut transferred,
                options,
            )
        })?;

        if transferred != write.len() as DWORD {
            return Err(BusError::TransferError {
                expected: write.len() as u32,
                actual: transferred,
            });
        }

        Ok(())
    }
}

impl Drop for Ft232hSpi {
    fn drop(&mut self) {
        unsafe {
            SPI_CloseChannel(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_options() {
        let options = config_options(&SpiConfig::default());
        assert_eq!(options, SPI_CONFIG_OPTION_MODE3 | SPI_CONFIG_OPTION_CS_ACTIVELOW);
    }

    #[test]
    fn test_channel_config_matches_default_spi_config() {
        let spi = SpiConfig::default();
        let channel = ChannelConfig::default();
        assert_eq!(channel.ClockRate, spi.frequency);
        assert_eq!(channel.configOptions, config_options(&spi));
        assert_eq!(channel.LatencyTimer, 1);
    }

    #[test]
    fn test_chip_select_bits() {
        let config = SpiConfig {
            chip_select: ChipSelect::Adbus4,
            mode: SpiMode::Mode0,
            ..SpiConfig::default()
        };
        assert_eq!(config_options(&config), 0x04 | 0x20);
    }
}
