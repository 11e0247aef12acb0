//! Common utilities shared across programs

use crate::error::Result;
use crate::mock::MockSpi;
use crate::transport::SpiTransport;
use embedded_hal::delay::DelayNs;
use log::info;
use std::time::{Duration, Instant};

/// Calibration bursts the simulated sensor holds still for
const SIMULATED_SETTLE_BURSTS: u64 = 128;

/// Open the bus the command-line programs run on
///
/// `simulate` selects the built-in walking-gait simulation; otherwise the
/// FT232H SPI channel `channel` is opened, which requires the `ftdi` feature.
pub fn open_transport(channel: u32, simulate: bool) -> Result<Box<dyn SpiTransport + Send>> {
    if simulate {
        info!("Using simulated gyroscope");
        return Ok(Box::new(MockSpi::walking(SIMULATED_SETTLE_BURSTS)));
    }
    open_hardware(channel)
}

#[cfg(feature = "ftdi")]
fn open_hardware(channel: u32) -> Result<Box<dyn SpiTransport + Send>> {
    Ok(Box::new(crate::ft232h::Ft232hSpi::open(channel)?))
}

#[cfg(not(feature = "ftdi"))]
fn open_hardware(channel: u32) -> Result<Box<dyn SpiTransport + Send>> {
    Err(crate::error::ConfigError::InvalidParameter(format!(
        "cannot open FT232H channel {}: built without the `ftdi` feature (use --simulate)",
        channel
    ))
    .into())
}

/// Blocking delay on the host: `thread::sleep` behind [`DelayNs`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

/// Tracks elapsed time since creation
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    /// Create a new TimeKeeper starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a horizontal bar graph for a value
///
/// # Arguments
/// * `value` - The value to display
/// * `max_value` - Maximum absolute value (defines scale)
/// * `width` - Total width of the bar in characters
///
/// # Example
/// ```
/// use ft232_gyro_spi::create_bar;
///
/// // Display +180°/s on a ±245°/s scale with 40-char width
/// let bar = create_bar(180.0, 245.0, 40);
/// println!("[{}]", bar);
/// ```
pub fn create_bar(value: f32, max_value: f32, width: usize) -> String {
    let normalized = (value / max_value).clamp(-1.0, 1.0);
    let center = width / 2;
    let bar_length = ((normalized.abs() * center as f32) as usize).min(center);

    let mut bar = String::new();

    if normalized < 0.0 {
        // Negative value: bar extends left from center
        bar.push_str(&" ".repeat(center - bar_length));
        bar.push_str(&"█".repeat(bar_length));
        bar.push('|');
        bar.push_str(&" ".repeat(center));
    } else {
        // Positive value: bar extends right from center
        bar.push_str(&" ".repeat(center));
        bar.push('|');
        bar.push_str(&"█".repeat(bar_length));
        bar.push_str(&" ".repeat(center - bar_length));
    }

    bar
}
