//! Serial poll backoff.
//!
//! Three levels: requeue after `busy_ms` while bytes are moving, every
//! `idle_ms` until `idle_after_ms` of quiet, then park for `park_ms` and
//! rely on a notification to wake the poller. Parking also clears the
//! "serial active" flag that keeps the node out of STOP2.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::BackoffConfig;

/// Poll pacing state shared by the poller and the receive interrupts.
pub struct PollBackoff {
    config: BackoffConfig,
    last_work_ms: Mutex<CriticalSectionRawMutex, Cell<u64>>,
    active: AtomicBool,
}

impl PollBackoff {
    /// Idle backoff that has never seen work.
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            last_work_ms: Mutex::new(Cell::new(0)),
            active: AtomicBool::new(false),
        }
    }

    /// Record that bytes moved at `now_ms`. Callable from interrupts.
    pub fn mark_work(&self, now_ms: u64) {
        self.last_work_ms.lock(|c| c.set(now_ms));
    }

    /// A poll pass is starting.
    pub fn begin_pass(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Delay before the next pass, given whether this one did work.
    pub fn next_wait_ms(&self, did_work: bool, now_ms: u64) -> u32 {
        if did_work {
            self.mark_work(now_ms);
            return self.config.busy_ms;
        }
        let last = self.last_work_ms.lock(Cell::get);
        let quiet_until = last.saturating_add(u64::from(self.config.idle_after_ms));
        if last != 0 && now_ms < quiet_until {
            return self.config.idle_ms;
        }
        self.active.store(false, Ordering::Release);
        self.config.park_ms
    }

    /// Whether the poller is busy or recently was.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NODE_CONFIG;

    #[test]
    fn busy_then_idle_then_park() {
        let b = PollBackoff::new(NODE_CONFIG.backoff);
        b.begin_pass();
        assert_eq!(b.next_wait_ms(true, 1_000), 1);
        assert!(b.is_active());
        assert_eq!(b.next_wait_ms(false, 1_050), 100);
        assert_eq!(b.next_wait_ms(false, 3_999), 100);
        assert!(b.is_active());
        assert_eq!(b.next_wait_ms(false, 4_000), 3_600_000);
        assert!(!b.is_active());
    }

    #[test]
    fn never_worked_parks_immediately() {
        let b = PollBackoff::new(NODE_CONFIG.backoff);
        b.begin_pass();
        assert_eq!(b.next_wait_ms(false, 10), 3_600_000);
        assert!(!b.is_active());
    }

    #[test]
    fn interrupt_activity_defers_parking() {
        let b = PollBackoff::new(NODE_CONFIG.backoff);
        b.mark_work(5_000);
        assert_eq!(b.next_wait_ms(false, 5_010), 100);
    }
}
