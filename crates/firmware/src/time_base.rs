//! Millisecond time base that survives STOP2.
//!
//! The tick interrupt advances `ms_from_ticks`. While the core is stopped
//! the tick is frozen, so the sleep manager measures the gap on the RTC and
//! adds it to `ms_from_sleep` with [`MonotonicClock::step`]. `now_ms` is the
//! sum of both and never goes backwards: both terms only grow.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::IsrSafe;

/// Milliseconds represented by one tick interrupt.
pub const MS_PER_TICK: u64 = 1;

#[derive(Debug, Clone, Copy, Default)]
struct ClockState {
    tick_count: u64,
    ms_from_ticks: u64,
    ms_from_sleep: u64,
}

/// Monotonic millisecond clock.
///
/// Shared between the tick interrupt and every task; all state sits behind a
/// short critical section, so every method is callable from either context.
pub struct MonotonicClock {
    state: Mutex<CriticalSectionRawMutex, Cell<ClockState>>,
}

impl MonotonicClock {
    /// A clock reading zero.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(ClockState {
                tick_count: 0,
                ms_from_ticks: 0,
                ms_from_sleep: 0,
            })),
        }
    }

    /// Tick interrupt body.
    pub fn on_tick(&self) {
        self.state.lock(|s| {
            let mut st = s.get();
            st.tick_count = st.tick_count.wrapping_add(1);
            st.ms_from_ticks = st.ms_from_ticks.saturating_add(MS_PER_TICK);
            s.set(st);
        });
    }

    /// Add time that passed while the tick was suspended.
    pub fn step(&self, ms: u64) {
        self.state.lock(|s| {
            let mut st = s.get();
            st.ms_from_sleep = st.ms_from_sleep.saturating_add(ms);
            s.set(st);
        });
    }

    /// Milliseconds since boot.
    pub fn now_ms(&self) -> u64 {
        self.state.lock(|s| {
            let st = s.get();
            st.ms_from_ticks.saturating_add(st.ms_from_sleep)
        })
    }

    /// Raw tick interrupts counted.
    pub fn tick_count(&self) -> u64 {
        self.state.lock(|s| s.get().tick_count)
    }

    /// Total time credited from STOP2 excursions.
    pub fn slept_ms(&self) -> u64 {
        self.state.lock(|s| s.get().ms_from_sleep)
    }

    /// Whether `ms` have passed since `began`. A `began` of 0 means "never
    /// started" and always counts as elapsed.
    pub fn elapsed(&self, began: u64, ms: u32) -> bool {
        began == 0 || self.now_ms() >= began.saturating_add(u64::from(ms))
    }

    /// Milliseconds until `deadline`, 0 if it is in the past.
    pub fn until(&self, deadline: u64) -> u32 {
        let left = deadline.saturating_sub(self.now_ms());
        u32::try_from(left).unwrap_or(u32::MAX)
    }

    /// Milliseconds since `then`, 0 if `then` is in the future.
    pub fn since(&self, then: u64) -> u64 {
        self.now_ms().saturating_sub(then)
    }

    /// Uptime.
    pub fn since_boot(&self) -> embassy_time::Duration {
        embassy_time::Duration::from_millis(self.now_ms())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl IsrSafe for MonotonicClock {}
