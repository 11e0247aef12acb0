//! Sample types shared across the driver

/// One burst snapshot of the three rate axes, in raw sensor counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    /// X-axis rate (raw value)
    pub x: i16,
    /// Y-axis rate (raw value)
    pub y: i16,
    /// Z-axis rate (raw value)
    pub z: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Axis values in X, Y, Z order
    pub fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(axes: [i16; 3]) -> Self {
        Self::new(axes[0], axes[1], axes[2])
    }

    pub fn axis(&self, axis: Axis) -> i16 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Rate axis selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{}', expected x, y or z", other)),
        }
    }
}

/// Control flow for streaming operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Continue streaming
    Continue,
    /// Stop streaming
    Break,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_selects_component() {
        let sample = RawSample::new(1, -2, 3);
        assert_eq!(sample.axis(Axis::X), 1);
        assert_eq!(sample.axis(Axis::Y), -2);
        assert_eq!(sample.axis(Axis::Z), 3);
        assert_eq!(RawSample::from_array(sample.to_array()), sample);
    }

    #[test]
    fn test_axis_parse() {
        assert_eq!("Z".parse::<Axis>(), Ok(Axis::Z));
        assert!("w".parse::<Axis>().is_err());
    }
}
