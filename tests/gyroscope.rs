//! Driver behaviour against the simulated bus

use approx::assert_relative_eq;
use embedded_hal::delay::DelayNs;
use ft232_gyro_spi::{
    Axis, BusError, ConfigError, FullScale, GyroError, Gyroscope, InitParameters, MockSpi, Phase,
    RawSample, StateError, DISTANCE_WINDOW,
};

const BURST_FRAME: [u8; 7] = [0xE8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Records every requested delay instead of sleeping
#[derive(Default)]
struct CountingDelay {
    calls: Vec<u32>,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls.push(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms * 1_000_000);
    }
}

fn driver_with_bias(bias: RawSample) -> (MockSpi, Gyroscope<MockSpi, CountingDelay>) {
    let mock = MockSpi::new();
    mock.push_repeated(bias, 128);
    let gyro = Gyroscope::new(mock.clone(), CountingDelay::default());
    (mock, gyro)
}

#[test]
fn calibrated_read_removes_bias_and_noise() {
    let (mock, mut gyro) = driver_with_bias(RawSample::new(100, -50, 0));
    gyro.setup(&InitParameters::new(0x00, 0x08, FullScale::Dps245)).unwrap();

    let cal = gyro.calibration();
    assert_eq!(cal.offset, [100, -50, 0]);
    assert_eq!(cal.threshold, [100, 50, 0]);
    assert_eq!(gyro.sample(), RawSample::default());

    // X and Y fall inside their noise gates, Z has none
    mock.push_samples([RawSample::new(105, -55, 3)]);
    let sample = gyro.update_calibrated_data().unwrap();
    assert_eq!(sample, RawSample::new(0, 0, 3));
    assert_eq!(gyro.sample(), sample);

    mock.push_samples([RawSample::new(300, -50, -7)]);
    assert_eq!(gyro.update_calibrated_data().unwrap(), RawSample::new(200, 0, -7));
}

#[test]
fn setup_traffic_is_bit_exact() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    let params = InitParameters {
        output_data_rate_and_power: 0x40,
        interrupt_config: 0x00,
        full_scale_select: 0x30,
    };
    gyro.setup(&params).unwrap();

    let frames = mock.frames();
    assert_eq!(frames.len(), 3 + 128);
    assert_eq!(frames[0], vec![0x20, 0x4F]);
    assert_eq!(frames[1], vec![0x22, 0x00]);
    assert_eq!(frames[2], vec![0x23, 0x30]);
    assert!(frames[3..].iter().all(|f| f.as_slice() == BURST_FRAME));

    assert_eq!(gyro.full_scale(), Some(FullScale::Dps2000));
    assert_eq!(gyro.sensitivity(), Some(0.07));
}

#[test]
fn calibration_waits_ten_ms_per_read() {
    let (_mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.setup(&InitParameters::default()).unwrap();

    let (_bus, delay) = gyro.release();
    assert_eq!(delay.calls.len(), 128);
    assert!(delay.calls.iter().all(|&ns| ns == 10_000_000));
}

#[test]
fn full_scale_codes_select_sensitivity() {
    for (code, sensitivity) in [(0x00, 0.008_75), (0x10, 0.017_5), (0x20, 0.07), (0x30, 0.07)] {
        let (_mock, mut gyro) = driver_with_bias(RawSample::default());
        let params = InitParameters {
            full_scale_select: code,
            ..InitParameters::default()
        };
        gyro.setup(&params).unwrap();
        assert_eq!(gyro.sensitivity(), Some(sensitivity));
        assert_relative_eq!(gyro.raw_to_angular_rate(1000).unwrap(), 1000.0 * sensitivity);
    }
}

#[test]
fn unrecognized_full_scale_sends_nothing() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    let params = InitParameters {
        full_scale_select: 0x08,
        ..InitParameters::default()
    };

    assert_eq!(
        gyro.setup(&params),
        Err(GyroError::Config(ConfigError::UnrecognizedFullScale(0x08)))
    );
    assert!(mock.frames().is_empty());
    assert_eq!(mock.config(), None);
    assert_eq!(gyro.phase(), Phase::Uninitialized);
    assert_eq!(gyro.conversion(), Err(StateError::NotConfigured));
}

#[test]
fn sampling_requires_setup() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    assert_eq!(
        gyro.update_calibrated_data(),
        Err(GyroError::State(StateError::NotActive(Phase::Uninitialized)))
    );
    assert!(mock.frames().is_empty());
}

#[test]
fn deactivate_without_setup_powers_down() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.deactivate().unwrap();

    assert_eq!(gyro.phase(), Phase::PoweredOff);
    assert_eq!(mock.frames(), vec![vec![0x20, 0x00]]);
    assert_eq!(mock.register(ft232_gyro_spi::registers::Register::CtrlReg1), Some(0x00));
}

#[test]
fn deactivate_keeps_conversion_available() {
    let (_mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.setup(&InitParameters::new(0, 0, FullScale::Dps500)).unwrap();
    gyro.deactivate().unwrap();

    assert!(matches!(
        gyro.update_calibrated_data(),
        Err(GyroError::State(StateError::NotActive(Phase::PoweredOff)))
    ));
    assert_relative_eq!(gyro.raw_to_angular_rate(-200).unwrap(), -3.5, epsilon = 1e-5);
}

#[test]
fn bus_fault_surfaces_and_keeps_sample() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.setup(&InitParameters::default()).unwrap();
    mock.push_samples([RawSample::new(9, 8, 7)]);
    gyro.update_calibrated_data().unwrap();

    mock.fail_after(0);
    let err = gyro.update_calibrated_data().unwrap_err();
    assert!(matches!(err, GyroError::Bus(BusError::Simulated(_))));
    assert_eq!(gyro.sample(), RawSample::new(9, 8, 7));
    assert_eq!(gyro.phase(), Phase::Active);

    mock.clear_fault();
    mock.push_samples([RawSample::new(1, 1, 1)]);
    assert_eq!(gyro.update_calibrated_data().unwrap(), RawSample::new(1, 1, 1));
}

#[test]
fn setup_again_recalibrates() {
    let (mock, mut gyro) = driver_with_bias(RawSample::new(10, 10, 10));
    gyro.setup(&InitParameters::default()).unwrap();
    gyro.deactivate().unwrap();

    mock.push_repeated(RawSample::new(-20, 0, 4), 128);
    gyro.setup(&InitParameters::new(0, 0, FullScale::Dps500)).unwrap();

    assert_eq!(gyro.phase(), Phase::Active);
    assert_eq!(gyro.calibration().offset, [-20, 0, 4]);
    assert_eq!(gyro.sensitivity(), Some(0.0175));
}

#[test]
fn distance_window_integrates_one_axis() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.setup(&InitParameters::new(0, 0, FullScale::Dps500)).unwrap();
    mock.set_idle_sample(RawSample::new(3000, -3000, 1000));

    // The counting delay returns immediately, so the 20 Hz schedule costs nothing
    let distance = gyro.collect_distance_window(Axis::Z).unwrap();

    let conversion = gyro.conversion().unwrap();
    let per_sample = (conversion.angular_rate_to_velocity(1000) * 0.05).abs();
    assert_relative_eq!(distance, per_sample * DISTANCE_WINDOW as f32, max_relative = 1e-4);
    assert_eq!(mock.bursts_served(), 128 + DISTANCE_WINDOW as u64);
}

#[test]
fn who_am_i_reads_identity_register() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    assert_eq!(gyro.who_am_i().unwrap(), 0xD4);
    assert_eq!(mock.frames(), vec![vec![0x8F, 0xFF]]);
}

#[test]
fn collected_window_matches_direct_distance() {
    let (mock, mut gyro) = driver_with_bias(RawSample::default());
    gyro.setup(&InitParameters::new(0, 0, FullScale::Dps500)).unwrap();
    mock.push_samples((0..DISTANCE_WINDOW as i16).map(|i| RawSample::new(0, 0, i - 200)));

    let samples = gyro.collect_samples(1000, DISTANCE_WINDOW).unwrap();
    let mut window = [0i16; DISTANCE_WINDOW];
    for (slot, s) in window.iter_mut().zip(&samples) {
        *slot = s.axis(Axis::Z);
    }

    let conversion = gyro.conversion().unwrap();
    let expected: f32 = (0..DISTANCE_WINDOW as i16)
        .map(|i| (conversion.angular_rate_to_velocity(i - 200) * 0.05).abs())
        .sum();
    assert_relative_eq!(gyro.compute_distance(&window).unwrap(), expected, max_relative = 1e-5);
}
