//! Simulated gyroscope bus for tests and hardware-free runs
//!
//! `MockSpi` behaves like the sensor behind a chip-select framed SPI link:
//! register writes land in a register file, `OUT_X_L` burst reads are
//! answered from a queue of scripted samples, and every framed transaction
//! is recorded for inspection. Clones share state, so a test can keep a
//! handle after moving the transport into the driver.
//!
//! The transaction log is unbounded by default; long-running simulations
//! cap it with [`MockSpi::set_frame_limit`] so only the newest frames stay.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::BusError;
use crate::registers::{self, Register, AUTO_INCREMENT, READ};
use crate::transport::{SpiConfig, SpiTransport};
use crate::types::RawSample;

/// Frames kept by the `--simulate` sensor
pub const SIMULATED_FRAME_LIMIT: usize = 1024;

type Generator = Box<dyn FnMut(u64) -> RawSample + Send>;

/// Mock SPI gyroscope
#[derive(Clone)]
pub struct MockSpi {
    inner: Arc<Mutex<MockSpiInner>>,
}

struct MockSpiInner {
    config: Option<SpiConfig>,
    frames: VecDeque<Vec<u8>>,
    frame_limit: Option<usize>,
    registers: HashMap<u8, u8>,
    samples: VecDeque<RawSample>,
    idle: RawSample,
    generator: Option<Generator>,
    bursts_served: u64,
    fail_after: Option<usize>,
}

impl MockSpi {
    /// Create a new mock gyroscope reporting WHO_AM_I = 0xD4
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        registers.insert(Register::WhoAmI.addr(), registers::WHO_AM_I_L3GD20);

        Self {
            inner: Arc::new(Mutex::new(MockSpiInner {
                config: None,
                frames: VecDeque::new(),
                frame_limit: None,
                registers,
                samples: VecDeque::new(),
                idle: RawSample::default(),
                generator: None,
                bursts_served: 0,
                fail_after: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockSpiInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue samples to be returned by the next burst reads, in order
    pub fn push_samples<I: IntoIterator<Item = RawSample>>(&self, samples: I) {
        self.lock().samples.extend(samples);
    }

    /// Queue the same sample `count` times
    pub fn push_repeated(&self, sample: RawSample, count: usize) {
        self.push_samples(std::iter::repeat(sample).take(count));
    }

    /// Sample returned once the queue is empty and no generator is set
    pub fn set_idle_sample(&self, sample: RawSample) {
        self.lock().idle = sample;
    }

    /// Synthesize samples from the burst index once the queue is empty
    pub fn set_generator<F>(&self, generator: F)
    where
        F: FnMut(u64) -> RawSample + Send + 'static,
    {
        self.lock().generator = Some(Box::new(generator));
    }

    /// Fail every transaction after `transactions` more have succeeded
    pub fn fail_after(&self, transactions: usize) {
        self.lock().fail_after = Some(transactions);
    }

    /// Stop injecting failures
    pub fn clear_fault(&self) {
        self.lock().fail_after = None;
    }

    /// Recorded framed transactions, oldest first, as transmitted bytes
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.iter().cloned().collect()
    }

    /// Keep at most `limit` frames, dropping the oldest; `None` keeps all
    pub fn set_frame_limit(&self, limit: Option<usize>) {
        let mut inner = self.lock();
        inner.frame_limit = limit;
        inner.trim_frames();
    }

    /// Clear the transaction log
    pub fn clear_frames(&self) {
        self.lock().frames.clear();
    }

    /// Current register file value
    pub fn register(&self, reg: Register) -> Option<u8> {
        self.lock().registers.get(&reg.addr()).copied()
    }

    /// Number of OUT_X_L burst reads answered so far
    pub fn bursts_served(&self) -> u64 {
        self.lock().bursts_served
    }

    /// Bus settings last applied
    pub fn config(&self) -> Option<SpiConfig> {
        self.lock().config
    }

    /// A stationary sensor with a small bias and jitter, rocking about Z
    ///
    /// Used by the binaries' `--simulate` mode: the first `settle` bursts
    /// are stationary so calibration sees only bias and noise.
    pub fn walking(settle: u64) -> Self {
        let mock = Self::new();
        mock.set_frame_limit(Some(SIMULATED_FRAME_LIMIT));
        mock.set_generator(move |n| {
            let jitter = ((n.wrapping_mul(2_654_435_761) >> 7) % 7) as i16 - 3;
            let bias = RawSample::new(12, -7, 4);
            if n < settle {
                return RawSample::new(bias.x + jitter, bias.y - jitter, bias.z + jitter / 2);
            }
            // One stride every 40 bursts
            let phase = (n - settle) as f32 / 40.0 * std::f32::consts::TAU;
            let swing = (phase.sin() * 6000.0) as i16;
            RawSample::new(bias.x + jitter, bias.y + swing / 8, bias.z + swing)
        });
        mock
    }
}

impl Default for MockSpi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpiInner {
    fn next_sample(&mut self) -> RawSample {
        let index = self.bursts_served;
        self.bursts_served += 1;
        if let Some(sample) = self.samples.pop_front() {
            return sample;
        }
        match self.generator.as_mut() {
            Some(generator) => generator(index),
            None => self.idle,
        }
    }

    fn trim_frames(&mut self) {
        if let Some(limit) = self.frame_limit {
            while self.frames.len() > limit {
                self.frames.pop_front();
            }
        }
    }

    fn check_fault(&mut self) -> Result<(), BusError> {
        match self.fail_after {
            Some(0) => Err(BusError::Simulated("injected transaction failure".to_string())),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl SpiTransport for MockSpi {
    fn configure(&mut self, config: &SpiConfig) -> Result<(), BusError> {
        self.lock().config = Some(*config);
        Ok(())
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        if write.len() != read.len() {
            return Err(BusError::TransferError {
                expected: write.len() as u32,
                actual: read.len() as u32,
            });
        }

        let mut inner = self.lock();
        inner.check_fault()?;
        inner.frames.push_back(write.to_vec());
        inner.trim_frames();

        read.fill(0);
        let Some((&command, payload)) = write.split_first() else {
            return Ok(());
        };

        let address = command & !(READ | AUTO_INCREMENT);
        if command & READ == 0 {
            // Register write: address byte then value byte
            if let Some(&value) = payload.first() {
                inner.registers.insert(address, value);
            }
            return Ok(());
        }

        if address == Register::OutXL.addr() && command & AUTO_INCREMENT != 0 {
            let bytes = registers::encode_burst(inner.next_sample());
            for (dst, src) in read[1..].iter_mut().zip(bytes.iter()) {
                *dst = *src;
            }
        } else {
            for (i, dst) in read[1..].iter_mut().enumerate() {
                let reg = if command & AUTO_INCREMENT != 0 {
                    address.wrapping_add(i as u8)
                } else {
                    address
                };
                *dst = inner.registers.get(&reg).copied().unwrap_or(0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_write_lands_in_register_file() {
        let mut spi = MockSpi::new();
        spi.write_register(0x20, 0x0F).unwrap();

        assert_eq!(spi.register(Register::CtrlReg1), Some(0x0F));
        assert_eq!(spi.frames(), vec![vec![0x20, 0x0F]]);
    }

    #[test]
    fn test_burst_read_serves_queue_then_idle() {
        let mut spi = MockSpi::new();
        spi.push_samples([RawSample::new(100, -50, 0)]);
        spi.set_idle_sample(RawSample::new(1, 2, 3));

        let mut data = [0u8; 6];
        spi.read_burst(0xE8, &mut data).unwrap();
        assert_eq!(registers::decode_burst(&data), RawSample::new(100, -50, 0));

        spi.read_burst(0xE8, &mut data).unwrap();
        assert_eq!(registers::decode_burst(&data), RawSample::new(1, 2, 3));
        assert_eq!(spi.bursts_served(), 2);
        assert_eq!(spi.frames()[0], vec![0xE8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_single_register_read() {
        let mut spi = MockSpi::new();
        let mut data = [0u8; 1];
        spi.read_burst(0x8F, &mut data).unwrap();
        assert_eq!(data[0], registers::WHO_AM_I_L3GD20);
    }

    #[test]
    fn test_injected_fault() {
        let mut spi = MockSpi::new();
        spi.fail_after(1);
        assert!(spi.write_register(0x20, 0x0F).is_ok());
        assert!(matches!(
            spi.write_register(0x20, 0x00),
            Err(BusError::Simulated(_))
        ));
        // Failed transactions are not recorded
        assert_eq!(spi.frames().len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let spi = MockSpi::new();
        let mut moved = spi.clone();
        moved.write_register(0x23, 0x10).unwrap();
        assert_eq!(spi.register(Register::CtrlReg4), Some(0x10));
    }

    #[test]
    fn test_frame_limit_keeps_newest() {
        let mut spi = MockSpi::new();
        spi.set_frame_limit(Some(2));
        spi.write_register(0x20, 0x01).unwrap();
        spi.write_register(0x20, 0x02).unwrap();
        spi.write_register(0x20, 0x03).unwrap();
        assert_eq!(spi.frames(), vec![vec![0x20, 0x02], vec![0x20, 0x03]]);

        spi.set_frame_limit(Some(1));
        assert_eq!(spi.frames(), vec![vec![0x20, 0x03]]);
    }

    #[test]
    fn test_walking_frame_log_stays_bounded() {
        let spi = MockSpi::walking(128);
        let mut bus: Box<dyn SpiTransport + Send> = Box::new(spi.clone());
        let mut data = [0u8; 6];
        for _ in 0..10_000 {
            bus.read_burst(0xE8, &mut data).unwrap();
        }

        assert_eq!(spi.bursts_served(), 10_000);
        assert_eq!(spi.frames().len(), SIMULATED_FRAME_LIMIT);
    }

    #[test]
    fn test_walking_settles_before_moving() {
        let mut spi = MockSpi::walking(128);
        let mut data = [0u8; 6];
        for _ in 0..128 {
            spi.read_burst(0xE8, &mut data).unwrap();
            let sample = registers::decode_burst(&data);
            assert!(sample.z.abs() < 10);
        }
    }
}
