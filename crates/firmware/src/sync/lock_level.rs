//! Lock levels and per-task lock bookkeeping.
//!
//! Locks must be taken in strictly increasing [`LockLevel`] order. A task
//! that already holds a level at or above the one it requests could close a
//! cycle with another task, so the request is refused as
//! [`Fatal::LockOrder`]. The order check runs in debug builds only.

use core::cell::Cell;
use core::fmt;

use crate::error::Fatal;

/// Totally ordered lock rank. Lower levels are taken first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LockLevel {
    /// A port's receive accumulator
    SerialRx = 0,
    /// A port's transmitter
    SerialTx = 1,
    /// Queue state
    Queue = 2,
    /// Event flags
    Event = 3,
}

impl LockLevel {
    /// All levels, lowest first.
    pub const ALL: [LockLevel; 4] = [
        LockLevel::SerialRx,
        LockLevel::SerialTx,
        LockLevel::Queue,
        LockLevel::Event,
    ];

    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SerialRx => "serial-rx",
            Self::SerialTx => "serial-tx",
            Self::Queue => "queue",
            Self::Event => "event",
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: discriminant <= 3
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Levels currently held by one task.
///
/// Owned by that task's [`TaskContext`](super::TaskContext); never shared.
#[derive(Debug, Default)]
pub struct LockTracker {
    held: Cell<u8>,
}

impl LockTracker {
    /// Tracker holding nothing.
    pub const fn new() -> Self {
        Self { held: Cell::new(0) }
    }

    /// Highest level held, if any.
    pub fn highest(&self) -> Option<LockLevel> {
        let held = self.held.get();
        LockLevel::ALL
            .iter()
            .rev()
            .copied()
            .find(|l| held & l.bit() != 0)
    }

    /// Whether `level` is held.
    pub fn holds(&self, level: LockLevel) -> bool {
        self.held.get() & level.bit() != 0
    }

    /// Whether no lock is held.
    pub fn is_empty(&self) -> bool {
        self.held.get() == 0
    }

    /// Refuse `level` if it does not rank strictly above everything held.
    pub fn check_acquire(&self, level: LockLevel) -> Result<(), Fatal> {
        if !cfg!(debug_assertions) {
            return Ok(());
        }
        match self.highest() {
            Some(held) if held >= level => Err(Fatal::LockOrder {
                held,
                attempted: level,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn acquired(&self, level: LockLevel) {
        self.held.set(self.held.get() | level.bit());
    }

    pub(crate) fn released(&self, level: LockLevel) {
        self.held.set(self.held.get() & !level.bit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(LockLevel::SerialRx < LockLevel::SerialTx);
        assert!(LockLevel::SerialTx < LockLevel::Queue);
        assert!(LockLevel::Queue < LockLevel::Event);
    }

    #[test]
    fn empty_tracker_accepts_anything() {
        let t = LockTracker::new();
        for l in LockLevel::ALL {
            assert_eq!(t.check_acquire(l), Ok(()));
        }
    }

    #[test]
    fn higher_level_accepted_equal_and_lower_refused() {
        let t = LockTracker::new();
        t.acquired(LockLevel::SerialTx);
        assert_eq!(t.check_acquire(LockLevel::Queue), Ok(()));
        assert_eq!(
            t.check_acquire(LockLevel::SerialTx),
            Err(Fatal::LockOrder {
                held: LockLevel::SerialTx,
                attempted: LockLevel::SerialTx
            })
        );
        assert_eq!(
            t.check_acquire(LockLevel::SerialRx),
            Err(Fatal::LockOrder {
                held: LockLevel::SerialTx,
                attempted: LockLevel::SerialRx
            })
        );
    }

    #[test]
    fn release_clears_only_that_level() {
        let t = LockTracker::new();
        t.acquired(LockLevel::SerialRx);
        t.acquired(LockLevel::Event);
        assert_eq!(t.highest(), Some(LockLevel::Event));
        t.released(LockLevel::Event);
        assert_eq!(t.highest(), Some(LockLevel::SerialRx));
        assert!(!t.holds(LockLevel::Event));
        t.released(LockLevel::SerialRx);
        assert!(t.is_empty());
    }
}
