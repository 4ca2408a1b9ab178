//! Task synchronisation primitives.
//!
//! - [`OrderedMutex`]: async mutex with a [`LockLevel`]; taking levels out of
//!   order or re-entering a lock is a [`Fatal`](crate::Fatal) error
//! - [`TaskSet`]: per-task counting notifications and the idle scan the
//!   sleep manager uses
//! - [`TaskEvent`]: binary event with timeout
//! - [`TaskQueue`]: bounded FIFO with blocking put/get and shutdown
//!
//! Every blocking call takes the caller's [`TaskContext`], which records the
//! locks that task holds.

pub mod event;
pub mod lock_level;
pub mod mutex;
pub mod notify;
pub mod queue;
pub mod task;

pub use event::{TaskEvent, Wake};
pub use lock_level::{LockLevel, LockTracker};
pub use mutex::{OrderedGuard, OrderedMutex};
pub use notify::{IsrTasks, TaskSet, Timeout, IDLE_FOREVER_MS};
pub use queue::TaskQueue;
pub use task::{TaskContext, TaskId};

/// Time left until `deadline`, zero once it has passed.
pub(crate) fn remaining(deadline: embassy_time::Instant) -> embassy_time::Duration {
    deadline.saturating_duration_since(embassy_time::Instant::now())
}

/// Deadline `ms` from now, saturating far in the future.
pub(crate) fn deadline_in(ms: u32) -> embassy_time::Instant {
    let now = embassy_time::Instant::now();
    now.checked_add(embassy_time::Duration::from_millis(u64::from(ms)))
        .unwrap_or(embassy_time::Instant::MAX)
}
