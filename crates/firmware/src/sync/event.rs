//! Binary event with timeout.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::with_timeout;

use super::{deadline_in, remaining, LockLevel, OrderedMutex, TaskContext};
use crate::error::Fatal;

/// Outcome of [`TaskEvent::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The event was signalled; the flag has been cleared
    Signalled,
    /// The timeout expired first
    TimedOut,
}

/// Auto-reset event.
///
/// A signal sent while nobody waits is remembered until the next `wait`.
pub struct TaskEvent {
    flag: OrderedMutex<bool>,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl TaskEvent {
    /// Unsignalled event.
    pub const fn new() -> Self {
        Self {
            flag: OrderedMutex::new(LockLevel::Event, false),
            signal: Signal::new(),
        }
    }

    /// Set the event and wake a waiter.
    pub async fn signal(&self, ctx: &TaskContext) -> Result<(), Fatal> {
        *self.flag.lock(ctx).await? = true;
        self.signal.signal(());
        Ok(())
    }

    /// Wait up to `timeout_ms` for the event.
    pub async fn wait(&self, ctx: &TaskContext, timeout_ms: u32) -> Result<Wake, Fatal> {
        let deadline = deadline_in(timeout_ms);
        loop {
            {
                let mut flag = self.flag.lock(ctx).await?;
                if *flag {
                    *flag = false;
                    return Ok(Wake::Signalled);
                }
            }
            if with_timeout(remaining(deadline), self.signal.wait())
                .await
                .is_err()
            {
                return Ok(Wake::TimedOut);
            }
        }
    }
}

impl Default for TaskEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sync::TaskId;

    #[tokio::test]
    async fn early_signal_is_remembered_once() {
        let ev = TaskEvent::new();
        let ctx = TaskContext::new(TaskId::Request);
        ev.signal(&ctx).await.unwrap();
        assert_eq!(ev.wait(&ctx, 10).await.unwrap(), Wake::Signalled);
        assert_eq!(ev.wait(&ctx, 5).await.unwrap(), Wake::TimedOut);
    }

    #[tokio::test]
    async fn waiter_wakes_on_signal_from_other_task() {
        let ev = TaskEvent::new();
        let waiter = TaskContext::new(TaskId::Request);
        let signaller = TaskContext::new(TaskId::Serial);
        let (woke, sent) = tokio::join!(ev.wait(&waiter, 1_000), async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            ev.signal(&signaller).await
        });
        assert_eq!(woke.unwrap(), Wake::Signalled);
        assert!(sent.is_ok());
    }

    #[tokio::test]
    async fn waiting_while_holding_event_level_is_fatal() {
        let ev = TaskEvent::new();
        let other = TaskEvent::new();
        let ctx = TaskContext::new(TaskId::Main);
        let _held = other.flag.lock(&ctx).await.unwrap();
        assert!(matches!(
            ev.wait(&ctx, 1).await,
            Err(Fatal::LockOrder { .. })
        ));
    }
}
