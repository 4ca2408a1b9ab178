//! Per-task notifications and the idle scan.
//!
//! Each task has a counting notification. `take` blocks until the count is
//! non-zero or the timeout expires, and consumes one. While blocked, the
//! task's due time is published so [`TaskSet::all_idle_for_ms`] can tell
//! the sleep manager how long every task will stay idle. A due time of 0
//! means the task is running.
//!
//! Due times are on the [`MonotonicClock`], which jumps forward after STOP2
//! while the embassy timer queue does not. The timer only paces the wait;
//! expiry is decided by the clock, and [`TaskSet::clock_stepped`] makes
//! every blocked task re-check after a jump.

use core::cell::Cell;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use platform::IsrSafe;

use super::{TaskContext, TaskId};
use crate::time_base::MonotonicClock;

/// How long `take` may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// At most this many milliseconds; 0 is treated as 1
    Ms(u32),
    /// Until notified
    Forever,
}

/// Idle time reported when no other task has a deadline.
pub const IDLE_FOREVER_MS: u32 = u32::MAX;

/// Capacity of the idle trace line.
pub const IDLE_TRACE_BYTES: usize = 96;

struct TaskSlot {
    registered: AtomicBool,
    non_blocking: AtomicBool,
    pending: AtomicU32,
    due_ms: Mutex<CriticalSectionRawMutex, Cell<u64>>,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl TaskSlot {
    const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            non_blocking: AtomicBool::new(false),
            pending: AtomicU32::new(0),
            due_ms: Mutex::new(Cell::new(0)),
            signal: Signal::new(),
        }
    }

    fn due(&self) -> u64 {
        self.due_ms.lock(Cell::get)
    }

    fn set_due(&self, due: u64) {
        self.due_ms.lock(|d| d.set(due));
    }

    fn notify(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.signal.signal(());
    }

    fn try_consume(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Notification slots for every task.
pub struct TaskSet<'c> {
    clock: &'c MonotonicClock,
    slots: [TaskSlot; TaskId::COUNT],
}

impl<'c> TaskSet<'c> {
    /// Slots for all tasks, none registered.
    pub const fn new(clock: &'c MonotonicClock) -> Self {
        Self {
            clock,
            slots: [
                TaskSlot::new(),
                TaskSlot::new(),
                TaskSlot::new(),
                TaskSlot::new(),
            ],
        }
    }

    fn slot(&self, id: TaskId) -> Option<&TaskSlot> {
        self.slots.get(id.index())
    }

    /// Mark a task as started.
    ///
    /// A `non_blocking` task never sleeps long enough to matter and is left
    /// out of the idle scan.
    pub fn register(&self, id: TaskId, non_blocking: bool) {
        if let Some(slot) = self.slot(id) {
            slot.set_due(0);
            slot.non_blocking.store(non_blocking, Ordering::Release);
            slot.registered.store(true, Ordering::Release);
        }
    }

    /// Whether a task has registered.
    pub fn is_registered(&self, id: TaskId) -> bool {
        self.slot(id)
            .is_some_and(|s| s.registered.load(Ordering::Acquire))
    }

    /// Block until notified or `timeout` expires.
    ///
    /// Returns `true` if a notification was consumed.
    pub async fn take(&self, ctx: &TaskContext, timeout: Timeout) -> bool {
        let Some(slot) = self.slot(ctx.id()) else {
            return false;
        };
        let ms = match timeout {
            Timeout::Ms(0) => 1,
            Timeout::Ms(ms) => ms,
            Timeout::Forever => IDLE_FOREVER_MS,
        };
        let due = self
            .clock
            .now_ms()
            .saturating_add(u64::from(ms))
            .max(1);
        slot.set_due(due);

        let notified = loop {
            if slot.try_consume() {
                break true;
            }
            match timeout {
                Timeout::Forever => slot.signal.wait().await,
                Timeout::Ms(_) => {
                    let left = self.clock.until(due);
                    if left == 0 {
                        break false;
                    }
                    let pace = Duration::from_millis(u64::from(left));
                    if with_timeout(pace, slot.signal.wait()).await.is_err() {
                        break slot.try_consume();
                    }
                }
            }
        };
        slot.set_due(0);
        notified
    }

    /// Notify another task. Notifying yourself is a no-op.
    pub fn give(&self, ctx: &TaskContext, to: TaskId) {
        if ctx.id() == to {
            return;
        }
        if let Some(slot) = self.slot(to) {
            slot.notify();
        }
    }

    /// Wake every blocked task without notifying it, so each one compares
    /// its due time against a clock that has just been stepped.
    pub fn clock_stepped(&self) {
        for slot in &self.slots {
            if slot.due() != 0 {
                slot.signal.signal(());
            }
        }
    }

    /// The interrupt-context view of this set.
    pub const fn isr(&self) -> IsrTasks<'_, 'c> {
        IsrTasks { tasks: self }
    }

    /// How long every task other than `me` will stay blocked.
    ///
    /// 0 if any of them is running or overdue; [`IDLE_FOREVER_MS`] if none
    /// has a deadline.
    pub fn all_idle_for_ms(&self, me: TaskId) -> u32 {
        self.scan(me, None)
    }

    /// [`all_idle_for_ms`][Self::all_idle_for_ms] plus a status line such
    /// as `NEXT:0ms M:run U:run R:3s`.
    pub fn idle_trace(&self, me: TaskId) -> (u32, heapless::String<IDLE_TRACE_BYTES>) {
        let mut status = heapless::String::<IDLE_TRACE_BYTES>::new();
        let ms = self.scan(me, Some(&mut status as &mut dyn core::fmt::Write));
        let mut line = heapless::String::new();
        // Truncation on overflow is acceptable for a trace line.
        let _ = write!(line, "NEXT:{ms}ms {status}");
        (ms, line)
    }

    fn scan(&self, me: TaskId, mut trace: Option<&mut dyn core::fmt::Write>) -> u32 {
        let now = self.clock.now_ms();
        let mut running = false;
        let mut earliest: Option<u64> = None;
        if let Some(w) = trace.as_mut() {
            let _ = write!(w, "{}:run", me.letter());
        }
        for id in TaskId::ALL {
            let Some(slot) = self.slot(id) else {
                continue;
            };
            if id == me
                || !slot.registered.load(Ordering::Acquire)
                || slot.non_blocking.load(Ordering::Acquire)
            {
                continue;
            }
            let due = slot.due();
            if due == 0 || due < now {
                running = true;
                match trace.as_mut() {
                    Some(w) => {
                        let state = if due == 0 { "run" } else { "due" };
                        let _ = write!(w, " {}:{}", id.letter(), state);
                    }
                    None => break,
                }
                continue;
            }
            let left = due.saturating_sub(now);
            if let Some(w) = trace.as_mut() {
                if left > 1_000 {
                    let _ = write!(w, " {}:{}s", id.letter(), left.saturating_div(1_000));
                } else {
                    let _ = write!(w, " {}:{}ms", id.letter(), left);
                }
            }
            earliest = Some(earliest.map_or(due, |e| e.min(due)));
        }
        if running {
            return 0;
        }
        earliest.map_or(IDLE_FOREVER_MS, |due| {
            u32::try_from(due.saturating_sub(now)).unwrap_or(IDLE_FOREVER_MS)
        })
    }
}

/// Interrupt-context handle: notify only, never block.
#[derive(Clone, Copy)]
pub struct IsrTasks<'a, 'c> {
    tasks: &'a TaskSet<'c>,
}

impl IsrTasks<'_, '_> {
    /// Notify a task from an interrupt.
    pub fn give_from_isr(&self, to: TaskId) {
        if let Some(slot) = self.tasks.slot(to) {
            slot.notify();
        }
    }

    /// Notify every registered task, e.g. on a USB presence edge.
    pub fn give_all_from_isr(&self) {
        for id in TaskId::ALL {
            if self.tasks.is_registered(id) {
                self.give_from_isr(id);
            }
        }
    }
}

impl IsrSafe for IsrTasks<'_, '_> {}
