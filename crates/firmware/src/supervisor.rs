//! Fatal error handling and deferred system actions.
//!
//! Every task loop ends in a [`Fatal`] or never ends. The supervisor logs the
//! cause, remembers it for the post-mortem, and resets the node. Restart and
//! bootloader requests from the diagnostic port are deferred until the
//! reply has gone out.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::SystemControl;

use crate::error::Fatal;

/// Work a request leaves for after its reply is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeferredWork {
    /// Nothing
    #[default]
    None,
    /// Reset the MCU
    Restart,
    /// Jump to the ROM bootloader
    Bootloader,
}

impl DeferredWork {
    /// Lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Restart => "restart",
            Self::Bootloader => "bootloader",
        }
    }
}

/// Maps fatal errors and deferred work onto [`SystemControl`].
pub struct Supervisor {
    last_fatal: Mutex<CriticalSectionRawMutex, Cell<Option<Fatal>>>,
}

impl Supervisor {
    /// Supervisor with no recorded failure.
    pub const fn new() -> Self {
        Self {
            last_fatal: Mutex::new(Cell::new(None)),
        }
    }

    /// Log `fatal` and reset. On hardware this does not return.
    pub fn fail<S: SystemControl>(&self, fatal: Fatal, system: &mut S) {
        error!("fatal: {}", fatal.name());
        self.last_fatal.lock(|c| c.set(Some(fatal)));
        system.restart();
    }

    /// The last fatal error handled, if any.
    pub fn last_fatal(&self) -> Option<Fatal> {
        self.last_fatal.lock(Cell::get)
    }

    /// Carry out deferred work.
    pub fn perform<S: SystemControl>(&self, work: DeferredWork, system: &mut S) {
        match work {
            DeferredWork::None => {}
            DeferredWork::Restart => {
                info!("supervisor: restart requested");
                system.restart();
            }
            DeferredWork::Bootloader => {
                info!("supervisor: bootloader requested");
                system.enter_bootloader();
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::LockLevel;
    use platform::mocks::MockSystem;

    #[test]
    fn fatal_restarts_and_is_remembered() {
        let sup = Supervisor::new();
        let mut sys = MockSystem::new();
        assert_eq!(sup.last_fatal(), None);
        let f = Fatal::Reentrant(LockLevel::Queue);
        sup.fail(f, &mut sys);
        assert_eq!(sys.restarts, 1);
        assert_eq!(sup.last_fatal(), Some(f));
    }

    #[test]
    fn deferred_work_maps_to_system_calls() {
        let sup = Supervisor::new();
        let mut sys = MockSystem::new();
        sup.perform(DeferredWork::None, &mut sys);
        assert_eq!((sys.restarts, sys.bootloader_jumps), (0, 0));
        sup.perform(DeferredWork::Restart, &mut sys);
        sup.perform(DeferredWork::Bootloader, &mut sys);
        assert_eq!((sys.restarts, sys.bootloader_jumps), (1, 1));
    }
}
