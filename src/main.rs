//! Gyroscope reader - Continuous data acquisition and display
//!
//! Sets up and calibrates the gyroscope, then shows calibrated angular
//! rates, tangential velocity and the distance covered over each 400-sample
//! window. Ctrl+C powers the sensor down before exiting.
//!
//! Usage:
//!   gyro-reader --simulate
//!   gyro-reader --channel 0 --full-scale 500 --axis z

use clap::Parser;
use ft232_gyro_spi::{
    common, create_bar, Axis, BusError, FullScale, GyroError, Gyroscope, InitParameters,
    StdDelay, StreamControl, TimeKeeper, DISTANCE_DT_S, DISTANCE_WINDOW,
};
use log::{error, info, warn};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gyro-reader")]
#[command(about = "Live display of calibrated gyroscope data", long_about = None)]
struct Args {
    /// FT232H SPI channel index
    #[arg(short, long, default_value = "0")]
    channel: u32,

    /// CTRL_REG1 output data rate bits (e.g. 0x40)
    #[arg(long, default_value = "0x00", value_parser = parse_byte)]
    odr: u8,

    /// CTRL_REG3 interrupt configuration
    #[arg(long, default_value = "0x08", value_parser = parse_byte)]
    interrupts: u8,

    /// Full-scale range in dps: 245, 500 or 2000
    #[arg(short, long, default_value = "245", value_parser = parse_full_scale)]
    full_scale: FullScale,

    /// Display update rate in Hz (distance needs a multiple of 20 Hz)
    #[arg(short, long, default_value = "20")]
    rate: u32,

    /// Axis integrated for distance
    #[arg(short, long, default_value = "z")]
    axis: Axis,

    /// Leg length in metres
    #[arg(long, default_value_t = ft232_gyro_spi::DEFAULT_LEG_LENGTH_M)]
    leg_length: f32,

    /// Run against the built-in simulated sensor
    #[arg(long)]
    simulate: bool,
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid register byte '{}': {}", s, e))
}

fn parse_full_scale(s: &str) -> Result<FullScale, String> {
    s.parse::<u16>()
        .ok()
        .and_then(FullScale::from_dps)
        .ok_or_else(|| format!("unsupported full scale '{}', expected 245, 500 or 2000", s))
}

/// Samples to skip between distance-window entries so the window keeps its
/// fixed integration step, or `None` when the display rate cannot be decimated
fn distance_stride(rate: u32) -> Option<u32> {
    let window_rate = (1.0 / DISTANCE_DT_S).round() as u32;
    (rate >= window_rate && rate % window_rate == 0).then(|| rate / window_rate)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("Gyroscope Reader");
    println!("================");
    println!("Initializing SPI interface...");

    let bus = match common::open_transport(args.channel, args.simulate) {
        Ok(bus) => bus,
        Err(GyroError::Bus(BusError::NoChannelsFound)) => {
            eprintln!("Error: No FT232H devices found.");
            eprintln!("Please check:");
            eprintln!("  1. FT232H is connected via USB");
            eprintln!("  2. FTDI drivers are installed");
            eprintln!("  3. No other application is using the device");
            return Err(Box::new(GyroError::Bus(BusError::NoChannelsFound)));
        }
        Err(e) => {
            eprintln!("Error opening SPI interface: {}", e);
            return Err(Box::new(e));
        }
    };

    let mut gyro = Gyroscope::with_leg_length(bus, StdDelay, args.leg_length);

    let who_am_i = gyro.who_am_i()?;
    info!("WHO_AM_I = {:#04x}", who_am_i);
    if who_am_i != ft232_gyro_spi::registers::WHO_AM_I_L3GD20
        && who_am_i != ft232_gyro_spi::registers::WHO_AM_I_I3G4250D
    {
        warn!("Unexpected WHO_AM_I {:#04x}; check wiring and SPI mode", who_am_i);
    }

    println!("Calibrating - keep the sensor still...");
    gyro.setup(&InitParameters::new(args.odr, args.interrupts, args.full_scale))?;
    let calibration = gyro.calibration();
    println!(
        "Calibration done: offset {:?}, threshold {:?}",
        calibration.offset, calibration.threshold
    );
    println!("Press Ctrl+C to exit\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let stride = distance_stride(args.rate);
    if stride.is_none() {
        warn!(
            "Distance needs a rate that is a multiple of {} Hz; distance disabled at {} Hz",
            (1.0 / DISTANCE_DT_S).round(),
            args.rate
        );
    }

    let conversion = gyro.conversion()?;
    let range = args.full_scale.range_dps();
    let timer = TimeKeeper::new();
    let mut sample_count = 0u64;
    let mut window: Vec<i16> = Vec::with_capacity(DISTANCE_WINDOW);
    let mut last_distance: Option<f32> = None;
    let mut total_distance = 0.0f32;

    // Clear screen once at start
    print!("\x1B[2J\x1B[H");
    io::stdout().flush()?;

    let result = gyro.stream(args.rate, |sample| {
        if !running.load(Ordering::SeqCst) {
            return StreamControl::Break;
        }
        sample_count += 1;

        if let Some(stride) = stride {
            if (sample_count - 1) % u64::from(stride) == 0 {
                window.push(sample.axis(args.axis));
            }
        }
        if let Ok(full) = <&[i16; DISTANCE_WINDOW]>::try_from(window.as_slice()) {
            let distance = conversion.compute_distance(full);
            total_distance += distance;
            last_distance = Some(distance);
            window.clear();
        }

        let [gx, gy, gz] = conversion.sample_to_dps(sample);
        let velocity = conversion.angular_rate_to_velocity(sample.axis(args.axis));
        let elapsed = timer.elapsed_secs();
        let sample_rate = if elapsed > 0.0 { sample_count as f64 / elapsed } else { 0.0 };

        // Move cursor to top without clearing (reduces flicker)
        print!("\x1B[H");
        println!("Gyroscope Reader - Live Data                                   ");
        println!("============================                                   ");
        println!(
            "Time: {:.2}s | Samples: {} | Rate: {:.1} Hz                    ",
            elapsed, sample_count, sample_rate
        );
        println!();
        println!(
            "ANGULAR RATE (°/s)              -{0:.0}°/s ◄───────┼───────► +{0:.0}°/s",
            range
        );
        println!("  X: {:8.2}°/s [{}]", gx, create_bar(gx, range, 40));
        println!("  Y: {:8.2}°/s [{}]", gy, create_bar(gy, range, 40));
        println!("  Z: {:8.2}°/s [{}]", gz, create_bar(gz, range, 40));
        println!();
        println!("LEG ({:?} axis, {:.2} m)                                        ", args.axis, args.leg_length);
        println!("  Velocity:      {:7.3} m/s                                  ", velocity);
        println!(
            "  Window:        {:3}/{} samples                             ",
            window.len(),
            DISTANCE_WINDOW
        );
        match last_distance {
            Some(d) => println!("  Last window:   {:7.3} m                                    ", d),
            None => println!("  Last window:       --                                      "),
        }
        if stride.is_some() {
            println!("  Total:         {:7.3} m                                    ", total_distance);
        } else {
            println!("  Total:             --                                      ");
        }
        println!();
        println!("Press Ctrl+C to exit                                           ");

        if io::stdout().flush().is_err() {
            return StreamControl::Break;
        }
        StreamControl::Continue
    });

    if let Err(e) = &result {
        error!("Streaming stopped: {}", e);
    }

    println!("\nPowering down...");
    gyro.deactivate()?;
    println!("Samples: {} | Distance: {:.3} m", sample_count, total_distance);

    result.map(|_| ()).map_err(|e| e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_stride_decimates_to_window_rate() {
        assert_eq!(distance_stride(20), Some(1));
        assert_eq!(distance_stride(100), Some(5));
        assert_eq!(distance_stride(1000), Some(50));
    }

    #[test]
    fn test_distance_stride_rejects_uneven_rates() {
        assert_eq!(distance_stride(10), None);
        assert_eq!(distance_stride(30), None);
        assert_eq!(distance_stride(1), None);
    }
}
