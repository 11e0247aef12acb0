//! Gyroscope driver: setup, calibration, sampling and power-down

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::calibration::{self, Calibration};
use crate::conversion::{Conversion, DEFAULT_LEG_LENGTH_M, DISTANCE_DT_S, DISTANCE_WINDOW};
use crate::error::{ConfigError, Result, StateError};
use crate::registers::{self, Ctrl1, FullScale, Register, BURST_LEN, POWER_OFF};
use crate::transport::{SpiConfig, SpiTransport};
use crate::types::{Axis, RawSample, StreamControl};

/// Register bytes written by [`Gyroscope::setup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitParameters {
    /// CTRL_REG1: output data rate and bandwidth (power and axis bits are forced on)
    pub output_data_rate_and_power: u8,
    /// CTRL_REG3: interrupt / data-ready routing
    pub interrupt_config: u8,
    /// CTRL_REG4: full-scale selection, one of 0x00, 0x10, 0x20, 0x30
    pub full_scale_select: u8,
}

impl InitParameters {
    pub fn new(output_data_rate_and_power: u8, interrupt_config: u8, full_scale: FullScale) -> Self {
        Self {
            output_data_rate_and_power,
            interrupt_config,
            full_scale_select: full_scale.code(),
        }
    }
}

impl Default for InitParameters {
    /// Lowest ODR, data-ready on INT2, ±245 dps
    fn default() -> Self {
        Self {
            output_data_rate_and_power: 0x00,
            interrupt_config: 0x08,
            full_scale_select: FullScale::Dps245.code(),
        }
    }
}

/// Driver lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, nothing written to the sensor
    Uninitialized,
    /// Registers written and sensitivity selected, calibration not finished
    Configured,
    /// Calibrated and sampling
    Active,
    /// Powered down; only a new `setup` leaves this phase
    PoweredOff,
}

/// Three-axis rate gyroscope on an SPI transport
///
/// Owns the bus, the delay provider and the latest calibrated sample.
pub struct Gyroscope<T, D> {
    bus: T,
    delay: D,
    phase: Phase,
    sample: RawSample,
    calibration: Calibration,
    full_scale: Option<FullScale>,
    leg_length: f32,
}

impl<T, D> Gyroscope<T, D>
where
    T: SpiTransport,
    D: DelayNs,
{
    /// Create a driver; nothing is sent until [`setup`](Self::setup)
    pub fn new(bus: T, delay: D) -> Self {
        Self::with_leg_length(bus, delay, DEFAULT_LEG_LENGTH_M)
    }

    /// Create a driver for a sensor mounted `leg_length` metres from the pivot
    pub fn with_leg_length(bus: T, delay: D, leg_length: f32) -> Self {
        Self {
            bus,
            delay,
            phase: Phase::Uninitialized,
            sample: RawSample::default(),
            calibration: Calibration::default(),
            full_scale: None,
            leg_length,
        }
    }

    /// Give back the transport and delay provider
    pub fn release(self) -> (T, D) {
        (self.bus, self.delay)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Latest calibrated sample
    pub fn sample(&self) -> RawSample {
        self.sample
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn full_scale(&self) -> Option<FullScale> {
        self.full_scale
    }

    /// Degrees per second per LSB, once a full-scale range has been selected
    pub fn sensitivity(&self) -> Option<f32> {
        self.full_scale.map(FullScale::sensitivity)
    }

    pub fn leg_length(&self) -> f32 {
        self.leg_length
    }

    fn write_reg(&mut self, reg: Register, value: u8) -> Result<()> {
        debug!("write_reg {:<9}({:#04X}) = {:#04x}", reg.name(), reg.addr(), value);
        self.bus.write_register(reg.addr(), value)?;
        Ok(())
    }

    /// Configure the bus and sensor, then calibrate
    ///
    /// The full-scale code is checked before anything is sent; an
    /// unrecognized code leaves the driver untouched. The sensor must be
    /// stationary: calibration takes about 1.3 s.
    pub fn setup(&mut self, params: &InitParameters) -> Result<()> {
        let full_scale = FullScale::from_code(params.full_scale_select)?;

        self.bus.configure(&SpiConfig::default())?;

        self.write_reg(
            Register::CtrlReg1,
            params.output_data_rate_and_power | Ctrl1::POWER_ON.bits(),
        )?;
        self.write_reg(Register::CtrlReg3, params.interrupt_config)?;
        self.write_reg(Register::CtrlReg4, params.full_scale_select)?;

        self.full_scale = Some(full_scale);
        self.phase = Phase::Configured;
        info!(
            "Gyroscope configured: ±{} dps, {} dps/LSB",
            full_scale.range_dps(),
            full_scale.sensitivity()
        );

        self.calibration = calibration::calibrate(&mut self.bus, &mut self.delay)?;
        self.sample = RawSample::default();
        self.phase = Phase::Active;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<RawSample> {
        let mut bytes = [0u8; BURST_LEN];
        self.bus
            .read_burst(registers::burst_read_command(Register::OutXL), &mut bytes)?;
        Ok(registers::decode_burst(&bytes))
    }

    /// Read one burst, subtract offsets and zero axes under their threshold
    ///
    /// The result replaces the stored sample and is also returned. On a bus
    /// error the stored sample is left as it was.
    pub fn update_calibrated_data(&mut self) -> Result<RawSample> {
        if self.phase != Phase::Active {
            return Err(StateError::NotActive(self.phase).into());
        }
        let raw = self.read_raw()?;
        self.sample = self.calibration.apply(raw);
        Ok(self.sample)
    }

    /// Power the sensor down
    ///
    /// Valid in every phase. The driver is `PoweredOff` afterwards even if the
    /// register write failed; the failure is still returned.
    pub fn deactivate(&mut self) -> Result<()> {
        self.phase = Phase::PoweredOff;
        let result = self.write_reg(Register::CtrlReg1, POWER_OFF);
        info!("Gyroscope powered down");
        result
    }

    /// Read WHO_AM_I (0xD3 for I3G4250D, 0xD4 for L3GD20)
    pub fn who_am_i(&mut self) -> Result<u8> {
        let mut value = [0u8; 1];
        self.bus
            .read_burst(registers::single_read_command(Register::WhoAmI), &mut value)?;
        Ok(value[0])
    }

    /// Conversion chain for the current sensitivity
    ///
    /// Stays available after `deactivate` so recorded samples can still be
    /// converted.
    pub fn conversion(&self) -> std::result::Result<Conversion, StateError> {
        self.full_scale
            .map(|fs| Conversion::new(fs.sensitivity(), self.leg_length))
            .ok_or(StateError::NotConfigured)
    }

    pub fn raw_to_angular_rate(&self, raw: i16) -> Result<f32> {
        Ok(self.conversion()?.raw_to_angular_rate(raw))
    }

    pub fn angular_rate_to_velocity(&self, raw: i16) -> Result<f32> {
        Ok(self.conversion()?.angular_rate_to_velocity(raw))
    }

    pub fn compute_distance(&self, samples: &[i16; DISTANCE_WINDOW]) -> Result<f32> {
        Ok(self.conversion()?.compute_distance(samples))
    }

    /// Stream calibrated samples at a specified rate with a callback function
    ///
    /// # Arguments
    /// * `rate_hz` - Target sample rate in Hz (1-1000)
    /// * `callback` - Called for each sample; return `StreamControl::Break` to stop
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of samples delivered before stopping
    pub fn stream<F>(&mut self, rate_hz: u32, mut callback: F) -> Result<u64>
    where
        F: FnMut(RawSample) -> StreamControl,
    {
        if rate_hz == 0 || rate_hz > 1000 {
            return Err(ConfigError::InvalidParameter(format!(
                "Sample rate must be between 1-1000 Hz, got {}",
                rate_hz
            ))
            .into());
        }

        let interval = Duration::from_micros(1_000_000 / rate_hz as u64);
        let mut sample_count = 0u64;
        let mut next_sample_time = Instant::now();

        loop {
            let data = self.update_calibrated_data()?;
            sample_count += 1;

            if callback(data) == StreamControl::Break {
                break;
            }

            // Running behind: continue immediately
            next_sample_time += interval;
            let now = Instant::now();
            if next_sample_time > now {
                let wait = next_sample_time - now;
                self.delay.delay_us(wait.as_micros().min(u32::MAX as u128) as u32);
            }
        }

        Ok(sample_count)
    }

    /// Stream calibrated samples for a fixed wall-clock duration
    pub fn stream_for<F>(&mut self, rate_hz: u32, duration: Duration, mut callback: F) -> Result<u64>
    where
        F: FnMut(RawSample),
    {
        let end_time = Instant::now() + duration;

        self.stream(rate_hz, |data| {
            callback(data);
            if Instant::now() >= end_time {
                StreamControl::Break
            } else {
                StreamControl::Continue
            }
        })
    }

    /// Collect `num_samples` calibrated samples at `rate_hz`
    pub fn collect_samples(&mut self, rate_hz: u32, num_samples: usize) -> Result<Vec<RawSample>> {
        let mut samples = Vec::with_capacity(num_samples);
        if num_samples == 0 {
            return Ok(samples);
        }

        self.stream(rate_hz, |data| {
            samples.push(data);
            if samples.len() >= num_samples {
                StreamControl::Break
            } else {
                StreamControl::Continue
            }
        })?;

        Ok(samples)
    }

    /// Sample one axis for a full distance window and integrate it
    ///
    /// Reads 400 calibrated samples at the integration step (20 Hz, 20 s).
    pub fn collect_distance_window(&mut self, axis: Axis) -> Result<f32> {
        let conversion = self.conversion()?;
        let rate_hz = (1.0 / DISTANCE_DT_S).round() as u32;
        let samples = self.collect_samples(rate_hz, DISTANCE_WINDOW)?;

        let mut window = [0i16; DISTANCE_WINDOW];
        for (slot, sample) in window.iter_mut().zip(&samples) {
            *slot = sample.axis(axis);
        }
        Ok(conversion.compute_distance(&window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BusError, GyroError};
    use crate::mock::MockSpi;

    #[derive(Default)]
    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn stationary(sample: RawSample) -> (MockSpi, Gyroscope<MockSpi, NoDelay>) {
        let mock = MockSpi::new();
        mock.push_repeated(sample, calibration::CALIBRATION_SAMPLES);
        let gyro = Gyroscope::new(mock.clone(), NoDelay);
        (mock, gyro)
    }

    #[test]
    fn test_setup_writes_control_registers_in_order() {
        let (mock, mut gyro) = stationary(RawSample::default());
        let params = InitParameters {
            output_data_rate_and_power: 0xC0,
            interrupt_config: 0x08,
            full_scale_select: 0x10,
        };
        gyro.setup(&params).unwrap();

        let frames = mock.frames();
        assert_eq!(frames[0], vec![0x20, 0xCF]);
        assert_eq!(frames[1], vec![0x22, 0x08]);
        assert_eq!(frames[2], vec![0x23, 0x10]);
        assert_eq!(frames.len(), 3 + calibration::CALIBRATION_SAMPLES);
        assert_eq!(mock.config(), Some(SpiConfig::default()));
        assert_eq!(gyro.phase(), Phase::Active);
        assert_eq!(gyro.sensitivity(), Some(0.0175));
    }

    #[test]
    fn test_unrecognized_full_scale_touches_nothing() {
        let (mock, mut gyro) = stationary(RawSample::default());
        let params = InitParameters {
            full_scale_select: 0x40,
            ..InitParameters::default()
        };

        let err = gyro.setup(&params).unwrap_err();
        assert_eq!(err, GyroError::Config(ConfigError::UnrecognizedFullScale(0x40)));
        assert_eq!(gyro.phase(), Phase::Uninitialized);
        assert_eq!(gyro.sensitivity(), None);
        assert!(mock.frames().is_empty());
    }

    #[test]
    fn test_failed_resetup_keeps_previous_sensitivity() {
        let (_mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::new(0, 0, FullScale::Dps2000)).unwrap();

        let bad = InitParameters {
            full_scale_select: 0x01,
            ..InitParameters::default()
        };
        assert!(gyro.setup(&bad).is_err());
        assert_eq!(gyro.sensitivity(), Some(0.07));
        assert_eq!(gyro.phase(), Phase::Active);
    }

    #[test]
    fn test_update_requires_active() {
        let (_mock, mut gyro) = stationary(RawSample::default());
        assert_eq!(
            gyro.update_calibrated_data(),
            Err(GyroError::State(StateError::NotActive(Phase::Uninitialized)))
        );

        gyro.setup(&InitParameters::default()).unwrap();
        assert!(gyro.update_calibrated_data().is_ok());

        gyro.deactivate().unwrap();
        assert_eq!(
            gyro.update_calibrated_data(),
            Err(GyroError::State(StateError::NotActive(Phase::PoweredOff)))
        );
    }

    #[test]
    fn test_calibration_bus_fault_leaves_configured() {
        let (mock, mut gyro) = stationary(RawSample::default());
        // 3 register writes + 10 calibration reads succeed
        mock.fail_after(13);

        let err = gyro.setup(&InitParameters::default()).unwrap_err();
        assert!(matches!(err, GyroError::Bus(BusError::Simulated(_))));
        assert_eq!(gyro.phase(), Phase::Configured);
        assert!(gyro.conversion().is_ok());
    }

    #[test]
    fn test_bus_fault_keeps_previous_sample() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        mock.push_samples([RawSample::new(40, 0, 0)]);
        assert_eq!(gyro.update_calibrated_data().unwrap(), RawSample::new(40, 0, 0));

        mock.fail_after(0);
        assert!(gyro.update_calibrated_data().is_err());
        assert_eq!(gyro.sample(), RawSample::new(40, 0, 0));
    }

    #[test]
    fn test_deactivate_from_uninitialized() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.deactivate().unwrap();
        assert_eq!(gyro.phase(), Phase::PoweredOff);
        assert_eq!(mock.frames(), vec![vec![0x20, 0x00]]);
    }

    #[test]
    fn test_deactivate_reports_bus_fault_but_powers_off() {
        let (mock, mut gyro) = stationary(RawSample::default());
        mock.fail_after(0);
        assert!(gyro.deactivate().is_err());
        assert_eq!(gyro.phase(), Phase::PoweredOff);
    }

    #[test]
    fn test_conversion_needs_configuration() {
        let (_mock, gyro) = stationary(RawSample::default());
        assert_eq!(gyro.conversion(), Err(StateError::NotConfigured));
        assert!(gyro.raw_to_angular_rate(100).is_err());
    }

    #[test]
    fn test_who_am_i() {
        let (_mock, mut gyro) = stationary(RawSample::default());
        assert_eq!(gyro.who_am_i().unwrap(), registers::WHO_AM_I_L3GD20);
    }

    #[test]
    fn test_stream_rejects_bad_rate() {
        let (_mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        assert!(matches!(
            gyro.stream(0, |_| StreamControl::Break),
            Err(GyroError::Config(ConfigError::InvalidParameter(_)))
        ));
    }

    #[test]
    fn test_collect_samples() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        mock.push_samples((1..=5).map(|i| RawSample::new(i, -i, 0)));

        let samples = gyro.collect_samples(1000, 5).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[4], RawSample::new(5, -5, 0));
    }

    #[test]
    fn test_stream_for_zero_duration_reads_once() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        mock.push_samples([RawSample::new(7, 8, 9)]);

        let mut seen = Vec::new();
        let count = gyro
            .stream_for(1000, Duration::ZERO, |sample| seen.push(sample))
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(seen, vec![RawSample::new(7, 8, 9)]);
    }

    #[test]
    fn test_stream_for_count_matches_callbacks() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        mock.set_frame_limit(Some(16));
        mock.set_idle_sample(RawSample::new(0, 300, 0));

        let started = Instant::now();
        let mut calls = 0u64;
        let count = gyro
            .stream_for(1000, Duration::from_millis(20), |sample| {
                assert_eq!(sample, RawSample::new(0, 300, 0));
                calls += 1;
            })
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(count >= 1);
        assert_eq!(count, calls);
        assert_eq!(mock.bursts_served(), calibration::CALIBRATION_SAMPLES as u64 + count);
    }

    #[test]
    fn test_stream_for_rejects_rate_before_reading() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        let served = mock.bursts_served();

        let result = gyro.stream_for(0, Duration::from_millis(5), |_| {});
        assert!(matches!(result, Err(GyroError::Config(ConfigError::InvalidParameter(_)))));
        assert_eq!(mock.bursts_served(), served);
    }

    #[test]
    fn test_stream_for_surfaces_bus_error() {
        let (mock, mut gyro) = stationary(RawSample::default());
        gyro.setup(&InitParameters::default()).unwrap();
        mock.fail_after(3);

        let mut calls = 0;
        let result = gyro.stream_for(1000, Duration::from_secs(60), |_| calls += 1);
        assert!(matches!(result, Err(GyroError::Bus(BusError::Simulated(_)))));
        assert_eq!(calls, 3);
    }
}
