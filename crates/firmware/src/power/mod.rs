//! Low-power management.
//!
//! [`ActivePeripherals`] tracks which peripherals are initialised; every
//! init and deinit path updates it. The sleep manager reads it to decide
//! whether STOP2 is safe and which peripherals to tear down and restore.

pub mod policy;
pub mod sleep;

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{IsrSafe, PeripheralId, PeripheralSet};

pub use policy::app_sleep_allowed;
pub use sleep::{SleepManager, SleepOutcome, SleepState, StayAwake};

/// The set of initialised peripherals.
pub struct ActivePeripherals {
    set: Mutex<CriticalSectionRawMutex, Cell<PeripheralSet>>,
}

impl ActivePeripherals {
    /// Nothing initialised.
    pub const fn new() -> Self {
        Self {
            set: Mutex::new(Cell::new(PeripheralSet::EMPTY)),
        }
    }

    /// A peripheral finished its init.
    pub fn insert(&self, id: PeripheralId) {
        self.set.lock(|s| {
            let mut v = s.get();
            v.insert(id);
            s.set(v);
        });
    }

    /// A peripheral was deinitialised.
    pub fn remove(&self, id: PeripheralId) {
        self.set.lock(|s| {
            let mut v = s.get();
            v.remove(id);
            s.set(v);
        });
    }

    /// Whether `id` is initialised.
    pub fn contains(&self, id: PeripheralId) -> bool {
        self.set.lock(|s| s.get().contains(id))
    }

    /// Copy of the current set.
    pub fn snapshot(&self) -> PeripheralSet {
        self.set.lock(Cell::get)
    }
}

impl Default for ActivePeripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl IsrSafe for ActivePeripherals {}
