//! FT232H-based SPI driver library for L3GD20-class three-axis gyroscopes
//!
//! This library configures the gyroscope over SPI, calibrates its zero-rate
//! offset and noise floor, reads calibrated samples and converts them into
//! angular rate, tangential velocity and distance travelled.
//!
//! The bus is abstracted by [`SpiTransport`]: an FT232H via FTDI libMPSSE
//! (`ftdi` feature), any embedded-hal 1.0 `SpiDevice` through [`HalSpi`], or
//! the simulated sensor [`MockSpi`].
//!
//! # Quick Start
//!
//! ## Setup and Reading
//! ```no_run
//! use ft232_gyro_spi::{FullScale, Gyroscope, InitParameters, MockSpi, StdDelay};
//!
//! let mut gyro = Gyroscope::new(MockSpi::walking(128), StdDelay);
//!
//! // Keep the sensor still: setup calibrates for ~1.3 s
//! gyro.setup(&InitParameters::new(0x00, 0x08, FullScale::Dps500))?;
//!
//! let sample = gyro.update_calibrated_data()?;
//! println!("Gyro Z: {:.2}°/s", gyro.raw_to_angular_rate(sample.z)?);
//! # Ok::<(), ft232_gyro_spi::GyroError>(())
//! ```
//!
//! ## Streaming for Real-Time Processing
//! ```no_run
//! use ft232_gyro_spi::{Gyroscope, InitParameters, MockSpi, StdDelay, StreamControl};
//!
//! let mut gyro = Gyroscope::new(MockSpi::walking(128), StdDelay);
//! gyro.setup(&InitParameters::default())?;
//! let conversion = gyro.conversion()?;
//!
//! gyro.stream(100, |sample| {
//!     let speed = conversion.angular_rate_to_velocity(sample.z).abs();
//!     if speed > 1.5 {
//!         println!("Fast swing: {:.2} m/s", speed);
//!         StreamControl::Break
//!     } else {
//!         StreamControl::Continue
//!     }
//! })?;
//! # Ok::<(), ft232_gyro_spi::GyroError>(())
//! ```
//!
//! ## Distance over a Window
//! ```no_run
//! use ft232_gyro_spi::{Axis, Gyroscope, InitParameters, MockSpi, StdDelay};
//!
//! let mut gyro = Gyroscope::new(MockSpi::walking(128), StdDelay);
//! gyro.setup(&InitParameters::default())?;
//!
//! // 400 samples at 20 Hz
//! let metres = gyro.collect_distance_window(Axis::Z)?;
//! println!("Distance: {:.2} m", metres);
//! gyro.deactivate()?;
//! # Ok::<(), ft232_gyro_spi::GyroError>(())
//! ```

pub mod calibration;
pub mod common;
pub mod conversion;
pub mod error;
#[cfg(feature = "ftdi")]
mod ffi;
#[cfg(feature = "ftdi")]
pub mod ft232h;
pub mod gyroscope;
#[cfg(feature = "recording")]
pub mod hdf5_format;
pub mod mock;
pub mod registers;
pub mod transport;
pub mod types;

// Re-export public API
pub use calibration::{calibrate, Calibration};
pub use common::{create_bar, StdDelay, TimeKeeper};
pub use conversion::{Conversion, DEFAULT_LEG_LENGTH_M, DISTANCE_DT_S, DISTANCE_WINDOW};
pub use error::{BusError, ConfigError, GyroError, Result, StateError};
#[cfg(feature = "ftdi")]
pub use ft232h::Ft232hSpi;
pub use gyroscope::{Gyroscope, InitParameters, Phase};
#[cfg(feature = "recording")]
pub use hdf5_format::{Hdf5Reader, Hdf5Writer, Metadata, TimestampedSample};
pub use mock::MockSpi;
pub use registers::FullScale;
pub use transport::{HalSpi, SpiConfig, SpiMode, SpiTransport};
pub use types::{Axis, RawSample, StreamControl};
