//! HDF5 file format for gyroscope recordings
//!
//! Layout:
//! - `/metadata` attributes: `start_time`, `sample_rate_hz`, `full_scale_dps`,
//!   `sensitivity_dps_per_lsb`, `leg_length_m`, `version`
//! - `/gyro_data` datasets: `timestamps` (f64 seconds), `gyro_x`, `gyro_y`,
//!   `gyro_z` (calibrated i16 counts)

use crate::conversion::Conversion;
use crate::registers::FullScale;
use crate::{GyroError, RawSample, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use log::debug;
use std::path::Path;

const FORMAT_VERSION: &str = "1.0";
const CHUNK_SIZE: usize = 1024;

fn storage_err(context: &str) -> impl Fn(hdf5::Error) -> GyroError + '_ {
    move |e| GyroError::Storage(format!("{}: {}", context, e))
}

fn to_unicode(value: &str) -> Result<VarLenUnicode> {
    value
        .parse()
        .map_err(|e| GyroError::Storage(format!("Invalid string attribute {:?}: {}", value, e)))
}

/// Calibrated sample with timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedSample {
    pub timestamp: f64, // Seconds since collection start
    pub data: RawSample,
}

/// Metadata stored in HDF5 file
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub start_time: String,           // ISO 8601 timestamp
    pub sample_rate_hz: f64,          // Target sample rate
    pub full_scale_dps: f32,          // Measurement range
    pub sensitivity_dps_per_lsb: f32, // Count to dps factor
    pub leg_length_m: f32,            // Radius used for velocity
    pub version: String,              // Format version
}

impl Metadata {
    /// Conversion chain matching the recording's settings
    pub fn conversion(&self) -> Conversion {
        Conversion::new(self.sensitivity_dps_per_lsb, self.leg_length_m)
    }
}

/// Handles for HDF5 datasets
struct DatasetHandles {
    timestamps: Dataset,
    gyro_x: Dataset,
    gyro_y: Dataset,
    gyro_z: Dataset,
}

/// HDF5 writer for gyroscope data collection
pub struct Hdf5Writer {
    file: File,
    datasets: DatasetHandles,
    sample_count: usize,
}

impl Hdf5Writer {
    /// Create a new HDF5 file for data collection
    ///
    /// # Arguments
    /// * `path` - File path
    /// * `rate` - Target sample rate in Hz
    /// * `full_scale` - Range the sensor was set up with
    /// * `leg_length` - Radius in metres used for velocity and distance
    pub fn create<P: AsRef<Path>>(
        path: P,
        rate: f64,
        full_scale: FullScale,
        leg_length: f32,
    ) -> Result<Self> {
        let file = File::create(path).map_err(storage_err("Failed to create HDF5 file"))?;

        let metadata_group = file
            .create_group("metadata")
            .map_err(storage_err("Failed to create metadata group"))?;

        let start_time = to_unicode(&chrono::Local::now().to_rfc3339())?;
        metadata_group
            .new_attr::<VarLenUnicode>()
            .create("start_time")
            .and_then(|attr| attr.write_scalar(&start_time))
            .map_err(storage_err("Failed to write start_time"))?;

        metadata_group
            .new_attr::<f64>()
            .create("sample_rate_hz")
            .and_then(|attr| attr.write_scalar(&rate))
            .map_err(storage_err("Failed to write sample_rate_hz"))?;

        for (name, value) in [
            ("full_scale_dps", full_scale.range_dps()),
            ("sensitivity_dps_per_lsb", full_scale.sensitivity()),
            ("leg_length_m", leg_length),
        ] {
            metadata_group
                .new_attr::<f32>()
                .create(name)
                .and_then(|attr| attr.write_scalar(&value))
                .map_err(storage_err(name))?;
        }

        let version = to_unicode(FORMAT_VERSION)?;
        metadata_group
            .new_attr::<VarLenUnicode>()
            .create("version")
            .and_then(|attr| attr.write_scalar(&version))
            .map_err(storage_err("Failed to write version"))?;

        let data_group = file
            .create_group("gyro_data")
            .map_err(storage_err("Failed to create gyro_data group"))?;

        let datasets = DatasetHandles {
            timestamps: Self::create_dataset::<f64>(&data_group, "timestamps")?,
            gyro_x: Self::create_dataset::<i16>(&data_group, "gyro_x")?,
            gyro_y: Self::create_dataset::<i16>(&data_group, "gyro_y")?,
            gyro_z: Self::create_dataset::<i16>(&data_group, "gyro_z")?,
        };

        debug!("Created HDF5 recording at {} Hz, ±{} dps", rate, full_scale.range_dps());

        Ok(Self {
            file,
            datasets,
            sample_count: 0,
        })
    }

    /// Create a resizable, chunked, compressed dataset
    fn create_dataset<T: hdf5::H5Type>(group: &Group, name: &str) -> Result<Dataset> {
        group
            .new_dataset::<T>()
            .shape((0..,)) // Resizable, starts at 0
            .chunk((CHUNK_SIZE,))
            .deflate(4)
            .create(name)
            .map_err(|e| GyroError::Storage(format!("Failed to create dataset {}: {}", name, e)))
    }

    /// Append a single sample
    pub fn append_sample(&mut self, sample: TimestampedSample) -> Result<()> {
        self.append_batch(&[sample])
    }

    /// Append a batch of samples
    pub fn append_batch(&mut self, samples: &[TimestampedSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let new_size = self.sample_count + samples.len();

        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
        let gyro_x: Vec<i16> = samples.iter().map(|s| s.data.x).collect();
        let gyro_y: Vec<i16> = samples.iter().map(|s| s.data.y).collect();
        let gyro_z: Vec<i16> = samples.iter().map(|s| s.data.z).collect();

        Self::append_to_dataset(&self.datasets.timestamps, new_size, &timestamps)?;
        Self::append_to_dataset(&self.datasets.gyro_x, new_size, &gyro_x)?;
        Self::append_to_dataset(&self.datasets.gyro_y, new_size, &gyro_y)?;
        Self::append_to_dataset(&self.datasets.gyro_z, new_size, &gyro_z)?;

        self.sample_count = new_size;
        Ok(())
    }

    fn append_to_dataset<T: hdf5::H5Type>(dataset: &Dataset, new_size: usize, data: &[T]) -> Result<()> {
        dataset
            .resize((new_size,))
            .map_err(storage_err("Failed to resize dataset"))?;

        let start = new_size - data.len();
        dataset
            .write_slice(data, start..)
            .map_err(storage_err("Failed to write to dataset"))?;

        Ok(())
    }

    /// Flush data to disk
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(storage_err("Failed to flush HDF5 file"))
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// HDF5 reader for recorded gyroscope data
pub struct Hdf5Reader {
    #[allow(dead_code)]
    file: File,
    datasets: DatasetHandles,
    metadata: Metadata,
}

impl Hdf5Reader {
    /// Open an existing HDF5 file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(storage_err("Failed to open HDF5 file"))?;

        let metadata = Self::read_metadata(&file)?;

        let data_group = file
            .group("gyro_data")
            .map_err(storage_err("Failed to open gyro_data group"))?;

        let open = |name: &str| {
            data_group
                .dataset(name)
                .map_err(|e| GyroError::Storage(format!("Failed to open {} dataset: {}", name, e)))
        };

        let datasets = DatasetHandles {
            timestamps: open("timestamps")?,
            gyro_x: open("gyro_x")?,
            gyro_y: open("gyro_y")?,
            gyro_z: open("gyro_z")?,
        };

        Ok(Self {
            file,
            datasets,
            metadata,
        })
    }

    fn read_metadata(file: &File) -> Result<Metadata> {
        let group = file
            .group("metadata")
            .map_err(storage_err("Failed to open metadata group"))?;

        let read_string = |name: &str| {
            group
                .attr(name)
                .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
                .map(|s| s.to_string())
                .map_err(|e| GyroError::Storage(format!("Failed to read {}: {}", name, e)))
        };
        let read_f32 = |name: &str| {
            group
                .attr(name)
                .and_then(|attr| attr.read_scalar::<f32>())
                .map_err(|e| GyroError::Storage(format!("Failed to read {}: {}", name, e)))
        };

        let sample_rate_hz = group
            .attr("sample_rate_hz")
            .and_then(|attr| attr.read_scalar::<f64>())
            .map_err(storage_err("Failed to read sample_rate_hz"))?;

        Ok(Metadata {
            start_time: read_string("start_time")?,
            sample_rate_hz,
            full_scale_dps: read_f32("full_scale_dps")?,
            sensitivity_dps_per_lsb: read_f32("sensitivity_dps_per_lsb")?,
            leg_length_m: read_f32("leg_length_m")?,
            version: read_string("version")?,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get total number of samples in file
    pub fn get_total_samples(&self) -> usize {
        self.datasets.timestamps.size()
    }

    /// Read a range of samples
    pub fn read_range(&self, start: usize, count: usize) -> Result<Vec<TimestampedSample>> {
        let total = self.get_total_samples();
        if start >= total {
            return Ok(Vec::new());
        }

        let end = start + count.min(total - start);

        let timestamps: Vec<f64> = self
            .datasets
            .timestamps
            .read_slice_1d(start..end)
            .map_err(storage_err("Failed to read timestamps"))?
            .to_vec();

        let read_axis = |dataset: &Dataset| -> Result<Vec<i16>> {
            Ok(dataset
                .read_slice_1d(start..end)
                .map_err(storage_err("Failed to read gyro axis"))?
                .to_vec())
        };
        let gyro_x = read_axis(&self.datasets.gyro_x)?;
        let gyro_y = read_axis(&self.datasets.gyro_y)?;
        let gyro_z = read_axis(&self.datasets.gyro_z)?;

        let samples = timestamps
            .into_iter()
            .zip(gyro_x)
            .zip(gyro_y)
            .zip(gyro_z)
            .map(|(((timestamp, x), y), z)| TimestampedSample {
                timestamp,
                data: RawSample::new(x, y, z),
            })
            .collect();

        Ok(samples)
    }

    /// Read every sample in the file
    pub fn read_all(&self) -> Result<Vec<TimestampedSample>> {
        self.read_range(0, self.get_total_samples())
    }

    /// Read the latest N samples
    pub fn read_latest(&self, count: usize) -> Result<Vec<TimestampedSample>> {
        let total = self.get_total_samples();
        self.read_range(total.saturating_sub(count), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{}_{}.h5", name, std::process::id()))
    }

    #[test]
    fn test_write_then_read_back() {
        let path = temp_path("gyro_roundtrip");
        {
            let mut writer = Hdf5Writer::create(&path, 20.0, FullScale::Dps500, 0.9).unwrap();
            let samples: Vec<_> = (0..10)
                .map(|i| TimestampedSample {
                    timestamp: i as f64 * 0.05,
                    data: RawSample::new(i, -i, 2 * i),
                })
                .collect();
            writer.append_batch(&samples).unwrap();
            writer.append_sample(samples[0]).unwrap();
            writer.flush().unwrap();
            assert_eq!(writer.sample_count(), 11);
        }

        let reader = Hdf5Reader::open(&path).unwrap();
        assert_eq!(reader.get_total_samples(), 11);
        assert_eq!(reader.metadata().sensitivity_dps_per_lsb, 0.0175);
        assert_eq!(reader.metadata().full_scale_dps, 500.0);
        assert_eq!(reader.metadata().version, FORMAT_VERSION);

        let latest = reader.read_latest(2).unwrap();
        assert_eq!(latest[0].data, RawSample::new(9, -9, 18));
        assert_eq!(latest[1].data, RawSample::new(0, 0, 0));
        assert!(reader.read_range(20, 5).unwrap().is_empty());

        std::fs::remove_file(&path).ok();
    }
}
