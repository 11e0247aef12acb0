//! Raw count → angular rate → linear velocity → distance
//!
//! Everything here is pure arithmetic over a fixed sensitivity and leg
//! length; nothing touches the bus.

use crate::types::RawSample;

/// Samples integrated by [`Conversion::compute_distance`]
pub const DISTANCE_WINDOW: usize = 400;
/// Time step between integrated samples, in seconds
pub const DISTANCE_DT_S: f32 = 0.05;
/// Radius from the rotation axis to the tracked point, in metres
pub const DEFAULT_LEG_LENGTH_M: f32 = 0.9;

const DEGREES_TO_RADIANS: f32 = std::f32::consts::PI / 180.0;

/// Conversion chain for one sensitivity setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    sensitivity: f32,
    leg_length: f32,
}

impl Conversion {
    /// # Arguments
    /// * `sensitivity` - Degrees per second per LSB
    /// * `leg_length` - Radius of the tracked point in metres
    pub fn new(sensitivity: f32, leg_length: f32) -> Self {
        Self {
            sensitivity,
            leg_length,
        }
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn leg_length(&self) -> f32 {
        self.leg_length
    }

    /// Angular rate in degrees per second
    pub fn raw_to_angular_rate(&self, raw: i16) -> f32 {
        raw as f32 * self.sensitivity
    }

    /// Tangential speed in m/s of a point `leg_length` from the rotation axis
    pub fn angular_rate_to_velocity(&self, raw: i16) -> f32 {
        raw as f32 * self.sensitivity * DEGREES_TO_RADIANS * self.leg_length
    }

    /// Path length covered over one window of samples, in metres
    ///
    /// Rectangular rule over `|velocity|`, so the result counts total travel
    /// regardless of direction and does not depend on sample order.
    pub fn compute_distance(&self, samples: &[i16; DISTANCE_WINDOW]) -> f32 {
        samples
            .iter()
            .map(|&raw| (self.angular_rate_to_velocity(raw) * DISTANCE_DT_S).abs())
            .sum()
    }

    /// All three axes in degrees per second
    pub fn sample_to_dps(&self, sample: RawSample) -> [f32; 3] {
        sample.to_array().map(|raw| self.raw_to_angular_rate(raw))
    }
}
