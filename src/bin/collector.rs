//! Gyroscope Data Collector
//!
//! Sets up and calibrates the gyroscope, then streams calibrated samples to
//! an HDF5 file until the duration elapses or Ctrl+C is pressed.
//!
//! Usage:
//!   collector --output walk.h5 --rate 20 --duration 60
//!   collector --simulate --duration 30

use clap::Parser;
use embedded_hal::delay::DelayNs;
use ft232_gyro_spi::{
    common, FullScale, Gyroscope, Hdf5Writer, InitParameters, SpiTransport, StdDelay,
    StreamControl, TimeKeeper, TimestampedSample,
};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Collect calibrated gyroscope data to HDF5 file", long_about = None)]
struct Args {
    /// Output HDF5 file path
    #[arg(short, long, default_value = "gyro_data.h5")]
    output: PathBuf,

    /// FT232H SPI channel index
    #[arg(short, long, default_value = "0")]
    channel: u32,

    /// Full-scale range in dps: 245, 500 or 2000
    #[arg(short, long, default_value = "245")]
    full_scale: u16,

    /// Target sample rate in Hz (1-1000)
    #[arg(short, long, default_value = "20")]
    rate: u32,

    /// Duration in seconds (optional, runs until Ctrl+C if omitted)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Leg length in metres, stored with the recording
    #[arg(long, default_value_t = ft232_gyro_spi::DEFAULT_LEG_LENGTH_M)]
    leg_length: f32,

    /// Run against the built-in simulated sensor
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(full_scale) = FullScale::from_dps(args.full_scale) else {
        eprintln!("Error: full scale must be 245, 500 or 2000 dps");
        std::process::exit(1);
    };

    if args.rate == 0 || args.rate > 1000 {
        eprintln!("Error: rate must be 1-1000 Hz");
        std::process::exit(1);
    }

    if args.rate != 20 {
        warn!("Distance windows assume 20 Hz sampling; recording at {} Hz", args.rate);
    }

    println!("Gyroscope Data Collector");
    println!("========================");
    println!("Full scale: ±{} dps", full_scale.range_dps());
    println!("Target rate: {} Hz", args.rate);
    println!("Output file: {}", args.output.display());
    if let Some(duration) = args.duration {
        println!("Duration: {} seconds", duration);
    } else {
        println!("Duration: continuous (Ctrl+C to stop)");
    }
    println!();

    println!("Calibrating - keep the sensor still...");
    let bus = common::open_transport(args.channel, args.simulate)?;
    let mut gyro = Gyroscope::with_leg_length(bus, StdDelay, args.leg_length);
    gyro.setup(&InitParameters::new(0x00, 0x08, full_scale))?;
    println!("Sensor ready!\n");

    let mut writer = Hdf5Writer::create(&args.output, args.rate as f64, full_scale, args.leg_length)?;
    info!("Created {}", args.output.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping collection...");
        r.store(false, Ordering::SeqCst);
    })?;

    let collection_start = Instant::now();
    let end_time = args.duration.map(|d| collection_start + Duration::from_secs(d));

    println!("Starting data collection...");
    println!("Press Ctrl+C to stop\n");

    let result = collect(&mut gyro, &mut writer, args.rate, running, end_time);

    if let Err(e) = gyro.deactivate() {
        error!("Failed to power down sensor: {}", e);
    }

    match result {
        Ok(()) => {
            let elapsed = collection_start.elapsed().as_secs_f64();
            let samples = writer.sample_count();

            println!("\nCollection complete!");
            println!("Total samples: {}", samples);
            println!("Elapsed time: {:.2} seconds", elapsed);
            println!("Actual sample rate: {:.1} Hz", samples as f64 / elapsed);
            println!("File: {}", args.output.display());
        }
        Err(e) => {
            eprintln!("\nError during collection: {}", e);
            eprintln!("Attempting to flush data...");
            if let Err(flush_err) = writer.flush() {
                eprintln!("Failed to flush: {}", flush_err);
            }
            return Err(e);
        }
    }

    Ok(())
}

/// Destination for collected batches
trait SampleSink {
    fn append_batch(&mut self, samples: &[TimestampedSample]) -> ft232_gyro_spi::Result<()>;
    fn flush(&mut self) -> ft232_gyro_spi::Result<()>;
}

impl SampleSink for Hdf5Writer {
    fn append_batch(&mut self, samples: &[TimestampedSample]) -> ft232_gyro_spi::Result<()> {
        Hdf5Writer::append_batch(self, samples)
    }

    fn flush(&mut self) -> ft232_gyro_spi::Result<()> {
        Hdf5Writer::flush(self)
    }
}

/// Stream samples into the writer in batches
fn collect<T: SpiTransport, D: DelayNs, W: SampleSink>(
    gyro: &mut Gyroscope<T, D>,
    writer: &mut W,
    rate: u32,
    running: Arc<AtomicBool>,
    end_time: Option<Instant>,
) -> Result<(), Box<dyn std::error::Error>> {
    let timer = TimeKeeper::new();
    let mut sample_buffer = Vec::with_capacity(BATCH_SIZE);
    let mut last_flush = Instant::now();
    let mut write_error = None;

    let streamed = gyro.stream(rate, |data| {
        if !running.load(Ordering::SeqCst) {
            return StreamControl::Break;
        }

        if let Some(end) = end_time {
            if Instant::now() >= end {
                return StreamControl::Break;
            }
        }

        sample_buffer.push(TimestampedSample {
            timestamp: timer.elapsed_secs(),
            data,
        });

        if sample_buffer.len() >= BATCH_SIZE {
            if let Err(e) = writer.append_batch(&sample_buffer) {
                write_error = Some(e);
                return StreamControl::Break;
            }
            sample_buffer.clear();

            if last_flush.elapsed() >= FLUSH_INTERVAL {
                if let Err(e) = writer.flush() {
                    warn!("Flush error: {}", e);
                }
                last_flush = Instant::now();
            }
        }

        StreamControl::Continue
    });

    if let Some(e) = write_error {
        return Err(e.into());
    }

    // Keep the partial batch even when the bus failed mid-stream
    let saved = writer.append_batch(&sample_buffer).and_then(|_| writer.flush());
    streamed?;
    saved?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft232_gyro_spi::{GyroError, MockSpi, RawSample};

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[derive(Default)]
    struct MemorySink {
        samples: Vec<TimestampedSample>,
        flushes: usize,
    }

    impl SampleSink for MemorySink {
        fn append_batch(&mut self, samples: &[TimestampedSample]) -> ft232_gyro_spi::Result<()> {
            self.samples.extend_from_slice(samples);
            Ok(())
        }

        fn flush(&mut self) -> ft232_gyro_spi::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_partial_batch_saved_on_bus_error() {
        let mock = MockSpi::new();
        mock.push_repeated(RawSample::default(), 128);
        let mut gyro = Gyroscope::new(mock.clone(), NoDelay);
        gyro.setup(&InitParameters::default()).unwrap();

        mock.set_idle_sample(RawSample::new(0, 0, 500));
        mock.fail_after(5);

        let mut sink = MemorySink::default();
        let running = Arc::new(AtomicBool::new(true));
        let result = collect(&mut gyro, &mut sink, 1000, running, None);

        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<GyroError>(), Some(GyroError::Bus(_))));
        assert_eq!(sink.samples.len(), 5);
        assert!(sink.samples.iter().all(|s| s.data == RawSample::new(0, 0, 500)));
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn test_stops_when_cleared() {
        let mock = MockSpi::new();
        mock.push_repeated(RawSample::default(), 128);
        let mut gyro = Gyroscope::new(mock, NoDelay);
        gyro.setup(&InitParameters::default()).unwrap();

        let mut sink = MemorySink::default();
        let running = Arc::new(AtomicBool::new(false));
        collect(&mut gyro, &mut sink, 1000, running, None).unwrap();
        assert!(sink.samples.is_empty());
        assert_eq!(sink.flushes, 1);
    }
}
