//! Capture and processing loops.
//!
//! The audio task runs two loops joined on one executor slot:
//!
//! - [`Capture`] keeps the PDM source busy. Each finished block is
//!   published to the pool and the processing side is woken.
//! - [`Processor`] decimates the oldest completed block, updates the
//!   [`SplMeter`], and releases it. With nothing to do it waits for a wake
//!   (or an hour).
//!
//! A capture error counts, logs, and re-arms the same block, so a
//! half-written block is never published.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::join::join;
use platform::{CaptureError, PdmSource, PeripheralId};

use super::decimator::Decimator;
use super::pool::{AudioConsumer, AudioProducer};
use crate::config::AudioConfig;
use crate::runtime::Runtime;
use crate::sync::{TaskContext, TaskId, TaskSet, Timeout};
use crate::time_base::MonotonicClock;

/// How long the processing loop sleeps with nothing to do.
pub const IDLE_WAIT_MS: u32 = 3_600_000;

/// Canonical quiet NaN: "no reading yet".
const NO_READING: u32 = 0x7FC0_0000;

/// Latest loudness and audio path counters, readable from any task.
pub struct SplMeter {
    last_db: AtomicU32,
    blocks: AtomicU32,
    capture_errors: AtomicU32,
}

impl SplMeter {
    /// No reading.
    pub const fn new() -> Self {
        Self {
            last_db: AtomicU32::new(NO_READING),
            blocks: AtomicU32::new(0),
            capture_errors: AtomicU32::new(0),
        }
    }

    /// Store the level of a processed block. Silence keeps the previous
    /// reading.
    pub fn record(&self, spl_db: Option<f32>) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        if let Some(db) = spl_db {
            self.last_db.store(db.to_bits(), Ordering::Relaxed);
        }
    }

    fn capture_error(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Last level in dB.
    pub fn last(&self) -> Option<f32> {
        let db = f32::from_bits(self.last_db.load(Ordering::Relaxed));
        (!db.is_nan()).then_some(db)
    }

    /// Blocks processed.
    pub fn blocks(&self) -> u32 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Failed captures.
    pub fn capture_errors(&self) -> u32 {
        self.capture_errors.load(Ordering::Relaxed)
    }
}

impl Default for SplMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SplMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(db) => write!(f, "spl: {db:.1}dB")?,
            None => f.write_str("spl: -")?,
        }
        write!(
            f,
            " blocks:{} errors:{}",
            self.blocks(),
            self.capture_errors()
        )
    }
}

/// The producer side: PDM source plus the pool's producer handle.
pub struct Capture<'a, S, const N: usize, const SIZE: usize> {
    source: S,
    producer: AudioProducer<'a, N, SIZE>,
    rearm: bool,
}

impl<'a, S: PdmSource, const N: usize, const SIZE: usize> Capture<'a, S, N, SIZE> {
    /// Capture into `producer`'s blocks.
    pub const fn new(source: S, producer: AudioProducer<'a, N, SIZE>) -> Self {
        Self {
            source,
            producer,
            rearm: false,
        }
    }

    /// Fill one block.
    ///
    /// On success the processing side is woken; the block is published on
    /// the next call. On error the next call refills the same block.
    pub async fn step(
        &mut self,
        clock: &MonotonicClock,
        tasks: &TaskSet<'_>,
        meter: &SplMeter,
    ) -> Result<(), CaptureError> {
        let block = if self.rearm {
            self.producer.rearm()
        } else {
            self.producer.acquire_next_free(clock.now_ms())
        };
        let Some(block) = block else {
            return Err(CaptureError::Transfer);
        };
        match self.source.read_block(block).await {
            Ok(()) => {
                self.rearm = false;
                tasks.isr().give_from_isr(TaskId::Audio);
                Ok(())
            }
            Err(e) => {
                self.rearm = true;
                meter.capture_error();
                warn!("audio: capture failed: {}", e.name());
                Err(e)
            }
        }
    }

    /// The PDM source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

/// The consumer side: decimates completed blocks.
pub struct Processor<'a, const N: usize, const SIZE: usize> {
    consumer: AudioConsumer<'a, N, SIZE>,
    decimator: Decimator,
    audio: AudioConfig,
}

impl<'a, const N: usize, const SIZE: usize> Processor<'a, N, SIZE> {
    /// Process blocks from `consumer`.
    pub const fn new(consumer: AudioConsumer<'a, N, SIZE>, audio: AudioConfig) -> Self {
        Self {
            consumer,
            decimator: Decimator::new(audio.oversampling),
            audio,
        }
    }

    /// Process the oldest completed block. Returns `false` if there was none.
    pub fn process_one(&mut self, clock: &MonotonicClock, meter: &SplMeter) -> bool {
        let Some(block) = self.consumer.acquire_next_completed(clock.now_ms()) else {
            return false;
        };
        let pcm = self.decimator.process(block.data());
        let spl = super::decimator::spl_db(pcm, &self.audio);
        meter.record(spl);
        block.release(clock.now_ms());
        true
    }
}

/// The audio task body. Never returns.
///
/// With audio disabled (or the pool already split) SAI1 stays inactive and
/// the task only sleeps.
pub async fn run<W, S: PdmSource>(rt: &Runtime<'_, W>, ctx: &TaskContext, source: S) {
    // Capture is paced by DMA, not deadlines; SAI1 being active is what
    // keeps the node out of STOP2.
    rt.tasks.register(TaskId::Audio, true);
    let audio = rt.config.audio;
    let split = if audio.enabled { rt.pool.split() } else { None };
    let Some((producer, consumer)) = split else {
        rt.peripherals.remove(PeripheralId::Sai1);
        info!("audio: disabled");
        loop {
            rt.tasks.take(ctx, Timeout::Forever).await;
        }
    };

    rt.peripherals.insert(PeripheralId::Sai1);
    info!("audio: capturing at osf {}", audio.oversampling.get());

    let mut capture = Capture::new(source, producer);
    let mut processor = Processor::new(consumer, audio);

    let produce = async {
        loop {
            // Errors are counted inside; the next step re-arms.
            let _ = capture.step(rt.clock, rt.tasks, &rt.spl).await;
        }
    };
    let consume = async {
        loop {
            if !processor.process_one(rt.clock, &rt.spl) {
                rt.tasks.take(ctx, Timeout::Ms(IDLE_WAIT_MS)).await;
            }
        }
    };
    join(produce, consume).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::NODE_CONFIG;
    use platform::mocks::MockPdm;
    use crate::audio::pool::BufferPool;

    type Pool = BufferPool<4, 64>;

    #[test]
    fn meter_starts_empty_and_keeps_last_reading_over_silence() {
        let m = SplMeter::new();
        assert_eq!(m.last(), None);
        m.record(Some(42.5));
        m.record(None);
        assert_eq!(m.last(), Some(42.5));
        assert_eq!(m.blocks(), 2);
    }

    #[test]
    fn meter_display() {
        let m = SplMeter::new();
        assert_eq!(std::format!("{m}"), "spl: - blocks:0 errors:0");
        m.record(Some(26.04));
        assert_eq!(std::format!("{m}"), "spl: 26.0dB blocks:1 errors:0");
    }

    #[tokio::test]
    async fn captured_blocks_flow_to_the_processor() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        tasks.register(TaskId::Audio, false);
        let meter = SplMeter::new();
        let pool = Pool::new();
        let (p, c) = pool.split().unwrap();
        let mut capture = Capture::new(MockPdm::new(0xAA), p);
        let mut processor = Processor::new(c, NODE_CONFIG.audio);

        capture.step(&clock, &tasks, &meter).await.unwrap();
        // First block is still BUSY.
        assert!(!processor.process_one(&clock, &meter));
        capture.step(&clock, &tasks, &meter).await.unwrap();
        assert!(processor.process_one(&clock, &meter));
        assert!(!processor.process_one(&clock, &meter));
        assert!(meter.last().is_some());
        assert_eq!(pool.stats().frees, 1);
    }

    #[tokio::test]
    async fn capture_error_rearms_the_same_block() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let meter = SplMeter::new();
        let pool = Pool::new();
        let (p, _c) = pool.split().unwrap();
        let mut pdm = MockPdm::new(0xFF);
        pdm.pending_errors = 2;
        let mut capture = Capture::new(pdm, p);

        assert!(capture.step(&clock, &tasks, &meter).await.is_err());
        assert!(capture.step(&clock, &tasks, &meter).await.is_err());
        capture.step(&clock, &tasks, &meter).await.unwrap();
        assert_eq!(meter.capture_errors(), 2);
        assert_eq!(pool.stats().gets, 1);
        assert_eq!(pool.completed(), 0);
        assert_eq!(capture.source().blocks(), 1);
    }

    #[tokio::test]
    async fn slow_consumer_counts_overruns() {
        let clock = MonotonicClock::new();
        let tasks = TaskSet::new(&clock);
        let meter = SplMeter::new();
        let pool = Pool::new();
        let (p, _c) = pool.split().unwrap();
        let mut capture = Capture::new(MockPdm::new(0), p);
        for _ in 0..6 {
            capture.step(&clock, &tasks, &meter).await.unwrap();
        }
        let s = pool.stats();
        assert_eq!(s.gets, 4);
        assert_eq!(s.overruns, 2);
        assert_eq!(pool.completed(), 3);
    }
}
