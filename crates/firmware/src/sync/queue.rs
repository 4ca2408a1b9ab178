//! Bounded FIFO between tasks.
//!
//! `put` and `get` block up to a timeout. [`TaskQueue::shut_down`] drops
//! the capacity to zero, after which every caller sees a timeout.

use embassy_time::{Duration, Timer};
use heapless::Deque;

use super::{deadline_in, remaining, LockLevel, OrderedMutex, TaskContext, TaskEvent};
use crate::error::Fatal;

/// How long [`TaskQueue::wake`] lets released waiters run.
pub const WAKE_SETTLE_MS: u64 = 100;

struct QueueState<T, const N: usize> {
    items: Deque<T, N>,
    capacity: usize,
}

/// Fixed-capacity queue of `Copy` entries.
pub struct TaskQueue<T, const N: usize> {
    state: OrderedMutex<QueueState<T, N>>,
    get_wait: TaskEvent,
    put_wait: TaskEvent,
}

impl<T: Copy, const N: usize> TaskQueue<T, N> {
    /// Empty queue holding up to `N` entries.
    pub const fn new() -> Self {
        Self {
            state: OrderedMutex::new(
                LockLevel::Queue,
                QueueState {
                    items: Deque::new(),
                    capacity: N,
                },
            ),
            get_wait: TaskEvent::new(),
            put_wait: TaskEvent::new(),
        }
    }

    /// Append `item`, waiting up to `wait_ms` for room.
    ///
    /// Returns `false` on timeout or after shutdown.
    pub async fn put(&self, ctx: &TaskContext, item: T, wait_ms: u32) -> Result<bool, Fatal> {
        let deadline = deadline_in(wait_ms);
        loop {
            {
                let mut st = self.state.lock(ctx).await?;
                if st.capacity == 0 {
                    return Ok(false);
                }
                if st.items.len() < st.capacity && st.items.push_back(item).is_ok() {
                    drop(st);
                    self.get_wait.signal(ctx).await?;
                    return Ok(true);
                }
            }
            let left = remaining(deadline);
            if left == Duration::from_ticks(0) {
                return Ok(false);
            }
            self.put_wait.wait(ctx, duration_ms(left)).await?;
        }
    }

    /// Remove the oldest entry, waiting up to `wait_ms` for one.
    ///
    /// `None` on timeout or after shutdown.
    pub async fn get(&self, ctx: &TaskContext, wait_ms: u32) -> Result<Option<T>, Fatal> {
        let deadline = deadline_in(wait_ms);
        loop {
            {
                let mut st = self.state.lock(ctx).await?;
                if st.capacity == 0 {
                    return Ok(None);
                }
                if let Some(item) = st.items.pop_front() {
                    drop(st);
                    self.put_wait.signal(ctx).await?;
                    return Ok(Some(item));
                }
            }
            let left = remaining(deadline);
            if left == Duration::from_ticks(0) {
                return Ok(None);
            }
            self.get_wait.wait(ctx, duration_ms(left)).await?;
        }
    }

    /// Entries waiting.
    pub async fn pending(&self, ctx: &TaskContext) -> Result<usize, Fatal> {
        Ok(self.state.lock(ctx).await?.items.len())
    }

    /// Release every waiter so it re-checks the queue, then give them time
    /// to run.
    pub async fn wake(&self, ctx: &TaskContext) -> Result<(), Fatal> {
        self.get_wait.signal(ctx).await?;
        self.put_wait.signal(ctx).await?;
        Timer::after(Duration::from_millis(WAKE_SETTLE_MS)).await;
        Ok(())
    }

    /// Drain to zero capacity and release all waiters.
    pub async fn shut_down(&self, ctx: &TaskContext) -> Result<(), Fatal> {
        {
            let mut st = self.state.lock(ctx).await?;
            st.capacity = 0;
            st.items.clear();
        }
        self.wake(ctx).await
    }
}

impl<T: Copy, const N: usize> Default for TaskQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX).max(1)
}
