//! PDM capture buffer pool.
//!
//! `N` fixed blocks cycle FREE → BUSY → COMPLETED → FREE. The capture side
//! ([`AudioProducer`]) always writes into the single BUSY block; handing it
//! a new one stamps the old one with the next sequence number and marks it
//! COMPLETED. The processing side ([`AudioConsumer`]) drains COMPLETED blocks
//! lowest sequence first, so order survives slot reuse.
//!
//! No locks: each slot's state is an atomic, and the roles are separate
//! types handed out once by [`BufferPool::split`]. Only the producer moves a
//! slot out of FREE or COMPLETED-from-BUSY; only the consumer moves one out
//! of COMPLETED.
//!
//! When no block is FREE the producer gets its current BUSY block back and
//! the overrun counter ticks. Blocks waiting for the consumer are never
//! overwritten.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

const FREE: u8 = 0;
const BUSY: u8 = 1;
const COMPLETED: u8 = 2;

/// Weight of history in the rolling averages, as a power of two.
const AVG_SHIFT: u32 = 3;

struct Slot<const SIZE: usize> {
    state: AtomicU8,
    seq: AtomicU32,
    data: UnsafeCell<[u8; SIZE]>,
}

impl<const SIZE: usize> Slot<SIZE> {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(FREE),
            seq: AtomicU32::new(0),
            data: UnsafeCell::new([0; SIZE]),
        }
    }
}

#[derive(Default)]
struct StatCells {
    gets: AtomicU32,
    frees: AtomicU32,
    overruns: AtomicU32,
    completed_high_water: AtomicU32,
    avg_get_interval_ms: AtomicU32,
    avg_process_ms: AtomicU32,
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolStats {
    /// Blocks handed to the producer
    pub gets: u32,
    /// Blocks released by the consumer
    pub frees: u32,
    /// Requests that found no FREE block
    pub overruns: u32,
    /// Most COMPLETED blocks seen waiting at once
    pub completed_high_water: u32,
    /// Rolling average time between producer requests
    pub avg_get_interval_ms: u32,
    /// Rolling average time the consumer held a block
    pub avg_process_ms: u32,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audio: gets:{} frees:{} overruns:{} hwm:{} get:{}ms proc:{}ms",
            self.gets,
            self.frees,
            self.overruns,
            self.completed_high_water,
            self.avg_get_interval_ms,
            self.avg_process_ms
        )
    }
}

fn rolling(avg: &AtomicU32, sample: u64) {
    let sample = u32::try_from(sample).unwrap_or(u32::MAX);
    let old = avg.load(Ordering::Relaxed);
    let new = if old == 0 {
        sample
    } else {
        let history = u64::from(old).saturating_mul((1u64 << AVG_SHIFT).saturating_sub(1));
        let sum = history.saturating_add(u64::from(sample));
        u32::try_from(sum >> AVG_SHIFT).unwrap_or(u32::MAX)
    };
    avg.store(new, Ordering::Relaxed);
}

/// `N` capture blocks of `SIZE` bytes.
pub struct BufferPool<const N: usize, const SIZE: usize> {
    slots: [Slot<SIZE>; N],
    next_seq: AtomicU32,
    split: AtomicBool,
    stats: StatCells,
}

// SAFETY: slot data is only reached through `AudioProducer` (the one BUSY
// slot) and `AudioConsumer` (COMPLETED slots). Each role exists at most once
// and the state atomics hand a slot from one to the other with
// release/acquire ordering, so no slot is ever aliased mutably.
unsafe impl<const N: usize, const SIZE: usize> Sync for BufferPool<N, SIZE> {}

impl<const N: usize, const SIZE: usize> BufferPool<N, SIZE> {
    /// All blocks FREE.
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::new() }; N],
            next_seq: AtomicU32::new(1),
            split: AtomicBool::new(false),
            stats: StatCells {
                gets: AtomicU32::new(0),
                frees: AtomicU32::new(0),
                overruns: AtomicU32::new(0),
                completed_high_water: AtomicU32::new(0),
                avg_get_interval_ms: AtomicU32::new(0),
                avg_process_ms: AtomicU32::new(0),
            },
        }
    }

    /// Hand out the two roles. Returns `None` after the first call.
    pub fn split(&self) -> Option<(AudioProducer<'_, N, SIZE>, AudioConsumer<'_, N, SIZE>)> {
        if self.split.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((
            AudioProducer {
                pool: self,
                busy: None,
                last_get_ms: None,
            },
            AudioConsumer { pool: self },
        ))
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let s = &self.stats;
        PoolStats {
            gets: s.gets.load(Ordering::Relaxed),
            frees: s.frees.load(Ordering::Relaxed),
            overruns: s.overruns.load(Ordering::Relaxed),
            completed_high_water: s.completed_high_water.load(Ordering::Relaxed),
            avg_get_interval_ms: s.avg_get_interval_ms.load(Ordering::Relaxed),
            avg_process_ms: s.avg_process_ms.load(Ordering::Relaxed),
        }
    }

    fn count(&self, state: u8) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == state)
            .count()
    }

    /// Blocks waiting for the consumer.
    pub fn completed(&self) -> usize {
        self.count(COMPLETED)
    }

    /// Blocks currently being filled. Never more than one.
    pub fn busy(&self) -> usize {
        self.count(BUSY)
    }
}

impl<const N: usize, const SIZE: usize> Default for BufferPool<N, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

/// The capture role.
pub struct AudioProducer<'a, const N: usize, const SIZE: usize> {
    pool: &'a BufferPool<N, SIZE>,
    busy: Option<usize>,
    last_get_ms: Option<u64>,
}

impl<const N: usize, const SIZE: usize> AudioProducer<'_, N, SIZE> {
    /// Finish the current block and get the next one to fill.
    ///
    /// With no FREE block this is an overrun and the current block is
    /// returned again. `None` only if the producer has never had a block
    /// and none is free.
    pub fn acquire_next_free(&mut self, now_ms: u64) -> Option<&mut [u8; SIZE]> {
        let pool = self.pool;
        if let Some(last) = self.last_get_ms {
            rolling(&pool.stats.avg_get_interval_ms, now_ms.saturating_sub(last));
        }
        self.last_get_ms = Some(now_ms);

        let free = pool
            .slots
            .iter()
            .position(|s| s.state.load(Ordering::Acquire) == FREE);

        match free {
            Some(next) => {
                if let Some(done) = self.busy.and_then(|i| pool.slots.get(i)) {
                    let seq = pool.next_seq.fetch_add(1, Ordering::Relaxed);
                    done.seq.store(seq, Ordering::Relaxed);
                    done.state.store(COMPLETED, Ordering::Release);
                    let waiting = u32::try_from(pool.completed()).unwrap_or(u32::MAX);
                    pool.stats
                        .completed_high_water
                        .fetch_max(waiting, Ordering::Relaxed);
                }
                if let Some(slot) = pool.slots.get(next) {
                    slot.state.store(BUSY, Ordering::Release);
                }
                self.busy = Some(next);
                pool.stats.gets.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                pool.stats.overruns.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.rearm()
    }

    /// The current BUSY block again, unchanged and uncounted. Used to refill
    /// a block whose capture failed.
    pub fn rearm(&mut self) -> Option<&mut [u8; SIZE]> {
        let slot = self.busy.and_then(|i| self.pool.slots.get(i))?;
        // SAFETY: this slot is BUSY and only the producer touches BUSY
        // slots; the returned borrow is tied to `&mut self`.
        Some(unsafe { &mut *slot.data.get() })
    }
}

/// The processing role.
pub struct AudioConsumer<'a, const N: usize, const SIZE: usize> {
    pool: &'a BufferPool<N, SIZE>,
}

impl<'a, const N: usize, const SIZE: usize> AudioConsumer<'a, N, SIZE> {
    /// Oldest COMPLETED block. Its state is unchanged until released.
    pub fn acquire_next_completed(&mut self, now_ms: u64) -> Option<CompletedBlock<'_, N, SIZE>> {
        let pool = self.pool;
        let (index, slot) = pool
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state.load(Ordering::Acquire) == COMPLETED)
            .min_by_key(|(_, s)| s.seq.load(Ordering::Relaxed))?;
        Some(CompletedBlock {
            pool,
            index,
            seq: slot.seq.load(Ordering::Relaxed),
            acquired_ms: now_ms,
            // SAFETY: the slot is COMPLETED; the producer only writes FREE
            // and BUSY slots, and this borrow ends before `release` frees it.
            data: unsafe { &*slot.data.get() },
        })
    }
}

/// A block being processed.
pub struct CompletedBlock<'c, const N: usize, const SIZE: usize> {
    pool: &'c BufferPool<N, SIZE>,
    index: usize,
    seq: u32,
    acquired_ms: u64,
    data: &'c [u8; SIZE],
}

impl<const N: usize, const SIZE: usize> CompletedBlock<'_, N, SIZE> {
    /// Completion order stamp.
    pub const fn seq(&self) -> u32 {
        self.seq
    }

    /// Block contents.
    pub const fn data(&self) -> &[u8; SIZE] {
        self.data
    }

    /// Return the block to the producer.
    pub fn release(self, now_ms: u64) {
        let pool = self.pool;
        if let Some(slot) = pool.slots.get(self.index) {
            slot.state.store(FREE, Ordering::Release);
            pool.stats.frees.fetch_add(1, Ordering::Relaxed);
            rolling(
                &pool.stats.avg_process_ms,
                now_ms.saturating_sub(self.acquired_ms),
            );
        }
    }
}
