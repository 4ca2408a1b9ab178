//! Level-checked async mutex.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use super::{LockLevel, TaskContext, TaskId};
use crate::error::Fatal;

const NO_OWNER: u8 = u8::MAX;

/// Async mutex that knows its [`LockLevel`] and its owner.
///
/// Taking it while already holding it is [`Fatal::Reentrant`]; taking it
/// while holding an equal or higher level is [`Fatal::LockOrder`]. The
/// guard releases the level when dropped.
pub struct OrderedMutex<T> {
    level: LockLevel,
    owner: AtomicU8,
    inner: Mutex<CriticalSectionRawMutex, T>,
}

impl<T> OrderedMutex<T> {
    /// Wrap `value` at `level`.
    pub const fn new(level: LockLevel, value: T) -> Self {
        Self {
            level,
            owner: AtomicU8::new(NO_OWNER),
            inner: Mutex::new(value),
        }
    }

    /// This mutex's level.
    pub const fn level(&self) -> LockLevel {
        self.level
    }

    /// Task currently holding the lock.
    pub fn owner(&self) -> Option<TaskId> {
        TaskId::from_raw(self.owner.load(Ordering::Acquire))
    }

    /// Whether a task other than the caller holds the lock.
    pub fn is_locked_by_other(&self, ctx: &TaskContext) -> bool {
        matches!(self.owner(), Some(id) if id != ctx.id())
    }

    fn check(&self, ctx: &TaskContext) -> Result<(), Fatal> {
        if self.owner() == Some(ctx.id()) {
            return Err(Fatal::Reentrant(self.level));
        }
        ctx.locks().check_acquire(self.level)
    }

    fn guard<'a>(
        &'a self,
        ctx: &'a TaskContext,
        inner: MutexGuard<'a, CriticalSectionRawMutex, T>,
    ) -> OrderedGuard<'a, T> {
        self.owner.store(ctx.id() as u8, Ordering::Release);
        ctx.locks().acquired(self.level);
        OrderedGuard {
            mutex: self,
            ctx,
            inner,
        }
    }

    /// Wait for the lock.
    pub async fn lock<'a>(&'a self, ctx: &'a TaskContext) -> Result<OrderedGuard<'a, T>, Fatal> {
        self.check(ctx)?;
        let inner = self.inner.lock().await;
        Ok(self.guard(ctx, inner))
    }

    /// Take the lock if it is free.
    ///
    /// `Ok(None)` means another task holds it; that is contention, not an
    /// error.
    pub fn try_lock<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> Result<Option<OrderedGuard<'a, T>>, Fatal> {
        self.check(ctx)?;
        Ok(self.inner.try_lock().ok().map(|inner| self.guard(ctx, inner)))
    }
}

/// Held lock. Dereferences to the protected value.
pub struct OrderedGuard<'a, T> {
    mutex: &'a OrderedMutex<T>,
    ctx: &'a TaskContext,
    inner: MutexGuard<'a, CriticalSectionRawMutex, T>,
}

impl<T> Deref for OrderedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for OrderedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        // Owner is cleared while the inner lock is still held; the inner
        // guard is dropped after this body.
        self.mutex.owner.store(NO_OWNER, Ordering::Release);
        self.ctx.locks().released(self.mutex.level);
    }
}
