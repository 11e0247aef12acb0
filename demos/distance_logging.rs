//! Example: Distance logging to CSV
//!
//! Calibrates the gyroscope, then logs two 400-sample distance windows
//! (20 Hz, 40 seconds) with per-sample velocity to a CSV file.
//!
//! Run with: cargo run --example distance_logging -- --simulate

use ft232_gyro_spi::{common, Axis, Gyroscope, InitParameters, StdDelay, DISTANCE_WINDOW};
use std::fs::File;
use std::io::Write;
use std::time::Instant;

const WINDOWS: usize = 2;
const RATE_HZ: u32 = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let simulate = std::env::args().any(|a| a == "--simulate");

    println!("Distance Logging Example");
    println!("========================\n");

    let bus = common::open_transport(0, simulate)?;
    let mut gyro = Gyroscope::new(bus, StdDelay);

    println!("Calibrating - keep the sensor still...");
    gyro.setup(&InitParameters::default())?;
    let conversion = gyro.conversion()?;

    let mut log_file = File::create("distance_log.csv")?;
    writeln!(log_file, "# started {}", chrono::Local::now().to_rfc3339())?;
    writeln!(log_file, "timestamp_ms,gyro_x_dps,gyro_y_dps,gyro_z_dps,velocity_z_ms")?;

    println!("Logging {} windows at {} Hz...", WINDOWS, RATE_HZ);
    println!("Output file: distance_log.csv\n");

    let start_time = Instant::now();
    let mut total = 0.0f32;

    for window_index in 0..WINDOWS {
        let samples = gyro.collect_samples(RATE_HZ, DISTANCE_WINDOW)?;
        let mut window = [0i16; DISTANCE_WINDOW];

        for (slot, sample) in window.iter_mut().zip(&samples) {
            *slot = sample.axis(Axis::Z);
            let [x, y, z] = conversion.sample_to_dps(*sample);
            writeln!(
                log_file,
                "{},{:.3},{:.3},{:.3},{:.4}",
                start_time.elapsed().as_millis(),
                x,
                y,
                z,
                conversion.angular_rate_to_velocity(sample.z)
            )?;
        }

        let distance = conversion.compute_distance(&window);
        total += distance;
        println!("Window {}: {:.3} m", window_index + 1, distance);
    }

    gyro.deactivate()?;

    println!("\nTotal distance: {:.3} m", total);
    println!("Log file saved successfully!");

    Ok(())
}
