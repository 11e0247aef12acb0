//! Gyroscope Data Analyzer
//!
//! Post-processing for gyroscope recordings: per-axis rate statistics, FFT
//! peaks (stride cadence) and distance covered per 400-sample window.
//!
//! Usage:
//!   analyzer --input walk.h5 --all
//!   analyzer --input walk.h5 --distance --axis y
//!   analyzer --input walk.h5 --start 5.0 --end 30.0 --fft

use clap::Parser;
use ft232_gyro_spi::{Axis, Conversion, Hdf5Reader, Metadata, TimestampedSample, DISTANCE_WINDOW};
use num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(about = "Analyze gyroscope data from HDF5 file", long_about = None)]
struct Args {
    /// Input HDF5 file path
    #[arg(short, long)]
    input: PathBuf,

    /// Start time in seconds (optional, default: file start)
    #[arg(long)]
    start: Option<f64>,

    /// End time in seconds (optional, default: file end)
    #[arg(long)]
    end: Option<f64>,

    /// Perform FFT frequency analysis
    #[arg(long)]
    fft: bool,

    /// FFT window size in samples
    #[arg(long, default_value = "256")]
    window: usize,

    /// Compute statistical metrics
    #[arg(long)]
    statistics: bool,

    /// Compute velocity and distance per 400-sample window
    #[arg(long)]
    distance: bool,

    /// Axis used for velocity and distance
    #[arg(short, long, default_value = "z")]
    axis: Axis,

    /// Run all analyses
    #[arg(long)]
    all: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let reader = Hdf5Reader::open(&args.input)?;
    let metadata = reader.metadata().clone();

    let run_statistics = args.all || args.statistics;
    let run_fft = args.all || args.fft;
    let run_distance = args.all || args.distance;

    if !run_statistics && !run_fft && !run_distance {
        eprintln!("Error: Must specify at least one analysis type (--statistics, --fft, --distance, or --all)");
        std::process::exit(1);
    }

    println!("Loading data from {}...", args.input.display());
    let all_samples = reader.read_all()?;

    let (Some(first), Some(last)) = (all_samples.first(), all_samples.last()) else {
        eprintln!("Error: No samples in file");
        return Ok(());
    };
    let (file_start, file_end) = (first.timestamp, last.timestamp);

    let start_time = args.start.unwrap_or(file_start);
    let end_time = args.end.unwrap_or(file_end);

    if start_time < file_start || end_time > file_end {
        eprintln!(
            "Warning: Requested time range [{}, {}] extends beyond file range [{}, {}]",
            start_time, end_time, file_start, file_end
        );
    }

    if start_time >= end_time {
        eprintln!("Error: Start time must be before end time");
        std::process::exit(1);
    }

    let samples: Vec<TimestampedSample> = all_samples
        .into_iter()
        .filter(|s| s.timestamp >= start_time && s.timestamp <= end_time)
        .collect();

    if samples.is_empty() {
        eprintln!("Error: No samples in specified time range");
        return Ok(());
    }

    println!("Loaded {} samples ({:.2}s to {:.2}s)", samples.len(), start_time, end_time);

    let mut output: Box<dyn Write> = if let Some(path) = args.output {
        Box::new(File::create(path)?)
    } else {
        Box::new(io::stdout())
    };

    write_header(&mut output, &metadata, &samples, start_time, end_time)?;

    let conversion = metadata.conversion();

    if run_statistics {
        write_section(&mut output, "STATISTICAL ANALYSIS")?;
        run_statistics_analysis(&mut output, &samples, &conversion)?;
    }

    if run_fft {
        write_section(&mut output, "FREQUENCY ANALYSIS (FFT)")?;
        run_fft_analysis(&mut output, &samples, &conversion, metadata.sample_rate_hz, args.window)?;
    }

    if run_distance {
        write_section(&mut output, "DISTANCE ANALYSIS")?;
        run_distance_analysis(&mut output, &samples, &conversion, args.axis)?;
    }

    writeln!(output, "\n{}", "=".repeat(80))?;
    writeln!(output, "Analysis complete!")?;

    Ok(())
}

fn write_section(output: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(output, "\n{}", "=".repeat(80))?;
    writeln!(output, "{}", title)?;
    writeln!(output, "{}", "=".repeat(80))
}

fn write_header(
    output: &mut dyn Write,
    metadata: &Metadata,
    samples: &[TimestampedSample],
    start_time: f64,
    end_time: f64,
) -> io::Result<()> {
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output, "GYROSCOPE DATA ANALYSIS REPORT")?;
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output)?;
    writeln!(output, "File Information:")?;
    writeln!(output, "  Sample rate: {:.1} Hz", metadata.sample_rate_hz)?;
    writeln!(output, "  Full scale: ±{} dps", metadata.full_scale_dps)?;
    writeln!(output, "  Sensitivity: {} dps/LSB", metadata.sensitivity_dps_per_lsb)?;
    writeln!(output, "  Leg length: {:.2} m", metadata.leg_length_m)?;
    writeln!(output, "  Start time: {}", metadata.start_time)?;
    writeln!(output, "  Format version: {}", metadata.version)?;
    writeln!(output)?;
    writeln!(output, "Analysis Range:")?;
    writeln!(output, "  Start: {:.2}s", start_time)?;
    writeln!(output, "  End: {:.2}s", end_time)?;
    writeln!(output, "  Duration: {:.2}s", end_time - start_time)?;
    writeln!(output, "  Samples: {}", samples.len())?;
    Ok(())
}

fn axis_dps(samples: &[TimestampedSample], conversion: &Conversion, axis: Axis) -> Vec<f32> {
    samples
        .iter()
        .map(|s| conversion.raw_to_angular_rate(s.data.axis(axis)))
        .collect()
}

// ============================================================================
// STATISTICS ANALYSIS
// ============================================================================

#[derive(Debug)]
struct Stats {
    mean: f32,
    rms: f32,
    std_dev: f32,
    min: f32,
    max: f32,
    peak_to_peak: f32,
}

fn compute_stats(data: &[f32]) -> Stats {
    let n = data.len() as f32;

    let mean = data.iter().sum::<f32>() / n;
    let rms = (data.iter().map(|&x| x * x).sum::<f32>() / n).sqrt();
    let variance = data.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / n;

    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    Stats {
        mean,
        rms,
        std_dev: variance.sqrt(),
        min,
        max,
        peak_to_peak: max - min,
    }
}

fn run_statistics_analysis(
    output: &mut dyn Write,
    samples: &[TimestampedSample],
    conversion: &Conversion,
) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "Angular Rate Statistics (°/s):")?;
    writeln!(output, "{:-<80}", "")?;
    writeln!(
        output,
        "{:<10} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "Axis", "Mean", "RMS", "Std Dev", "Min", "Max", "Peak-Peak"
    )?;
    writeln!(output, "{:-<80}", "")?;

    for axis in Axis::ALL {
        let stats = compute_stats(&axis_dps(samples, conversion, axis));
        writeln!(
            output,
            "{:<10} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            format!("{:?}", axis),
            stats.mean,
            stats.rms,
            stats.std_dev,
            stats.min,
            stats.max,
            stats.peak_to_peak
        )?;
    }

    // Calibrated data gates noise to exactly zero
    writeln!(output)?;
    writeln!(output, "Stationary fraction (all axes gated to zero):")?;
    let still = samples.iter().filter(|s| s.data.to_array() == [0, 0, 0]).count();
    writeln!(
        output,
        "  {} of {} samples ({:.1}%)",
        still,
        samples.len(),
        100.0 * still as f64 / samples.len() as f64
    )?;

    Ok(())
}

// ============================================================================
// FFT ANALYSIS
// ============================================================================

struct FrequencyPeak {
    frequency: f64,
    magnitude: f64,
}

fn apply_hann_window(data: &[f32]) -> Vec<f64> {
    let n = data.len();
    data.iter()
        .enumerate()
        .map(|(i, &x)| {
            let window = 0.5 * (1.0 - ((2.0 * PI * i as f64) / (n as f64 - 1.0)).cos());
            x as f64 * window
        })
        .collect()
}

fn analyze_frequencies(data: &[f32], sample_rate: f64, window_size: usize) -> Vec<FrequencyPeak> {
    if window_size < 4 || data.len() < window_size {
        return Vec::new();
    }

    let mut buffer: Vec<Complex<f64>> = apply_hann_window(&data[..window_size])
        .into_iter()
        .map(|x| Complex::new(x, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(window_size);
    fft.process(&mut buffer);

    // Only the first half: the second mirrors it for real input
    let magnitudes: Vec<f64> = buffer
        .iter()
        .take(window_size / 2)
        .map(|c| c.norm() / window_size as f64)
        .collect();

    let threshold = magnitudes.iter().copied().fold(0.0, f64::max) * 0.1; // 10% of max
    let mut peaks: Vec<FrequencyPeak> = magnitudes
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > threshold && w[1] > w[0] && w[1] > w[2])
        .map(|(i, w)| FrequencyPeak {
            frequency: ((i + 1) as f64 * sample_rate) / window_size as f64,
            magnitude: w[1],
        })
        .collect();

    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks
}

fn run_fft_analysis(
    output: &mut dyn Write,
    samples: &[TimestampedSample],
    conversion: &Conversion,
    sample_rate: f64,
    window_size: usize,
) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "FFT Parameters:")?;
    writeln!(output, "  Window size: {} samples", window_size)?;
    writeln!(output, "  Window type: Hann")?;
    writeln!(output, "  Frequency resolution: {:.3} Hz", sample_rate / window_size as f64)?;
    writeln!(output, "  Max frequency: {:.1} Hz", sample_rate / 2.0)?;
    writeln!(output)?;

    if samples.len() < window_size {
        writeln!(
            output,
            "Warning: Insufficient samples for FFT (need {}, have {})",
            window_size,
            samples.len()
        )?;
        return Ok(());
    }

    writeln!(output, "Angular Rate Frequency Analysis:")?;
    writeln!(output, "{:-<80}", "")?;
    for axis in Axis::ALL {
        let data = axis_dps(samples, conversion, axis);
        let peaks = analyze_frequencies(&data, sample_rate, window_size);

        writeln!(output, "\nGyro {:?} - Top 5 Frequency Peaks:", axis)?;
        if peaks.is_empty() {
            writeln!(output, "  No significant peaks detected")?;
            continue;
        }
        for (i, peak) in peaks.iter().take(5).enumerate() {
            writeln!(
                output,
                "  {}. {:.3} Hz (magnitude: {:.4})",
                i + 1,
                peak.frequency,
                peak.magnitude
            )?;
        }
        // Dominant swing frequency of a leg is the stride rate
        writeln!(output, "  Cadence estimate: {:.1} strides/min", peaks[0].frequency * 60.0)?;
    }

    Ok(())
}

// ============================================================================
// DISTANCE ANALYSIS
// ============================================================================

fn run_distance_analysis(
    output: &mut dyn Write,
    samples: &[TimestampedSample],
    conversion: &Conversion,
    axis: Axis,
) -> io::Result<()> {
    writeln!(output)?;
    writeln!(output, "Distance Parameters:")?;
    writeln!(output, "  Axis: {:?}", axis)?;
    writeln!(output, "  Leg length: {:.2} m", conversion.leg_length())?;
    writeln!(output, "  Window: {} samples", DISTANCE_WINDOW)?;
    writeln!(output)?;

    let raw: Vec<i16> = samples.iter().map(|s| s.data.axis(axis)).collect();
    let velocity: Vec<f32> = raw.iter().map(|&r| conversion.angular_rate_to_velocity(r)).collect();
    let peak_velocity = velocity.iter().fold(0.0f32, |a, &v| a.max(v.abs()));

    writeln!(output, "Tangential Velocity (m/s):")?;
    writeln!(output, "  RMS: {:.4} m/s", compute_stats(&velocity).rms)?;
    writeln!(output, "  Peak: {:.4} m/s", peak_velocity)?;
    writeln!(output)?;

    let mut total = 0.0f32;
    let mut chunks = raw.chunks_exact(DISTANCE_WINDOW);
    writeln!(output, "{:<10} {:>12} {:>14}", "Window", "Start (s)", "Distance (m)")?;
    writeln!(output, "{:-<40}", "")?;
    for (i, chunk) in chunks.by_ref().enumerate() {
        let Ok(window) = <&[i16; DISTANCE_WINDOW]>::try_from(chunk) else {
            continue;
        };
        let distance = conversion.compute_distance(window);
        total += distance;
        writeln!(
            output,
            "{:<10} {:>12.2} {:>14.3}",
            i + 1,
            samples[i * DISTANCE_WINDOW].timestamp,
            distance
        )?;
    }

    let remainder = chunks.remainder().len();
    writeln!(output, "{:-<40}", "")?;
    writeln!(output, "Total distance: {:.3} m", total)?;
    if remainder > 0 {
        writeln!(output, "  ({} trailing samples not in a full window)", remainder)?;
    }

    Ok(())
}
