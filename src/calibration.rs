//! Zero-rate offset and noise threshold calibration
//!
//! The sensor must be stationary. 128 bursts are read 10 ms apart; the mean
//! of each axis becomes its zero offset and the largest magnitude seen on
//! each axis becomes its noise gate.

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::error::Result;
use crate::registers::{self, Register, BURST_LEN};
use crate::transport::SpiTransport;
use crate::types::RawSample;

/// Bursts averaged per calibration
pub const CALIBRATION_SAMPLES: usize = 128;
/// log2(CALIBRATION_SAMPLES)
const CALIBRATION_SHIFT: u32 = 7;
/// Settling time between calibration reads
pub const CALIBRATION_INTERVAL_MS: u32 = 10;

/// Per-axis zero offsets and noise thresholds, X, Y, Z order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub offset: [i16; 3],
    pub threshold: [i16; 3],
}

impl Calibration {
    /// Offset-corrected, noise-gated copy of `raw`
    ///
    /// An axis whose corrected magnitude is below its threshold reads zero.
    pub fn apply(&self, raw: RawSample) -> RawSample {
        let mut axes = raw.to_array();
        for (i, value) in axes.iter_mut().enumerate() {
            let corrected = value.saturating_sub(self.offset[i]);
            *value = if (corrected as i32).abs() < self.threshold[i] as i32 {
                0
            } else {
                corrected
            };
        }
        RawSample::from_array(axes)
    }
}

/// Running sums and peak magnitudes over calibration samples
#[derive(Debug, Clone, Default)]
pub struct CalibrationAccumulator {
    sum: [i32; 3],
    peak: [i16; 3],
    count: usize,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: RawSample) {
        for (i, value) in sample.to_array().into_iter().enumerate() {
            self.sum[i] += value as i32;
            self.peak[i] = self.peak[i].max(value.saturating_abs());
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Offsets are `sum >> 7`: floor division, so negative means round down
    pub fn finish(&self) -> Calibration {
        Calibration {
            offset: self.sum.map(|sum| (sum >> CALIBRATION_SHIFT) as i16),
            threshold: self.peak,
        }
    }
}

/// Run the calibration procedure on a stationary sensor
///
/// Blocks for 128 reads plus 128 × 10 ms delays. A bus error aborts the
/// run and is returned; no partial result is produced.
pub fn calibrate<T, D>(bus: &mut T, delay: &mut D) -> Result<Calibration>
where
    T: SpiTransport + ?Sized,
    D: DelayNs + ?Sized,
{
    let command = registers::burst_read_command(Register::OutXL);
    let mut accumulator = CalibrationAccumulator::new();
    let mut bytes = [0u8; BURST_LEN];

    debug!("Calibrating: {} samples, {} ms apart", CALIBRATION_SAMPLES, CALIBRATION_INTERVAL_MS);

    for _ in 0..CALIBRATION_SAMPLES {
        bus.read_burst(command, &mut bytes)?;
        accumulator.add(registers::decode_burst(&bytes));
        delay.delay_ms(CALIBRATION_INTERVAL_MS);
    }

    let calibration = accumulator.finish();
    info!(
        "Calibration complete: offset {:?}, threshold {:?}",
        calibration.offset, calibration.threshold
    );
    Ok(calibration)
}
