//! The interrupt-context API
//!
//! Handlers may only touch types that implement [`IsrSafe`]: everything they
//! do completes without blocking, allocating, or taking a task-level lock.
//! Keeping this surface separate from the task API means an ISR cannot call
//! a blocking function by accident: the type it holds does not have one.

/// Marker for types whose entire API is safe to call from an interrupt.
///
/// Implementors must only use atomics, critical sections shorter than a few
/// dozen instructions, and non-blocking signals.
pub trait IsrSafe: Sync {}

/// Non-blocking notification from interrupt context.
pub trait IsrNotify: IsrSafe {
    /// Mark that work is pending. `error` reports a receive fault that
    /// caused the producer to reset itself.
    fn notify_from_isr(&self, error: bool);
}
