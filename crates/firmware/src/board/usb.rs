//! USB presence.
//!
//! The VBUS detect pin interrupts on both edges. Either edge wakes every
//! task: the poller brings the USB peripheral up or down, and the sleep
//! policy re-evaluates.

use core::sync::atomic::{AtomicU8, Ordering};

use platform::{IsrSafe, PeripheralId, UsbPresence};

use crate::power::ActivePeripherals;
use crate::sync::IsrTasks;

/// What [`UsbMonitor::sync`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbTransition {
    /// No change
    None,
    /// Cable attached; peripheral brought up
    Attached,
    /// Cable removed; peripheral torn down
    Detached,
}

const PRESENT: u8 = 0;
const ABSENT: u8 = 1;
const UNKNOWN: u8 = 2;

const fn encode(p: UsbPresence) -> u8 {
    match p {
        UsbPresence::Present => PRESENT,
        UsbPresence::Absent => ABSENT,
        UsbPresence::Unknown => UNKNOWN,
    }
}

/// Last sensed USB presence.
pub struct UsbMonitor {
    presence: AtomicU8,
}

impl UsbMonitor {
    /// Monitor seeded with the presence sensed at boot.
    pub const fn new(initial: UsbPresence) -> Self {
        Self {
            presence: AtomicU8::new(encode(initial)),
        }
    }

    /// Current presence.
    pub fn presence(&self) -> UsbPresence {
        match self.presence.load(Ordering::Acquire) {
            PRESENT => UsbPresence::Present,
            ABSENT => UsbPresence::Absent,
            _ => UsbPresence::Unknown,
        }
    }

    /// Whether a host is attached.
    pub fn is_present(&self) -> bool {
        self.presence() == UsbPresence::Present
    }

    /// VBUS edge interrupt.
    pub fn on_edge_from_isr(&self, presence: UsbPresence, tasks: IsrTasks<'_, '_>) {
        self.presence.store(encode(presence), Ordering::Release);
        tasks.give_all_from_isr();
    }

    /// Bring the USB peripheral in line with presence.
    pub fn sync(&self, active: &ActivePeripherals) -> UsbTransition {
        let up = active.contains(PeripheralId::Usb);
        match (self.is_present(), up) {
            (true, false) => {
                active.insert(PeripheralId::Usb);
                info!("usb: attached");
                UsbTransition::Attached
            }
            (false, true) => {
                active.remove(PeripheralId::Usb);
                info!("usb: detached");
                UsbTransition::Detached
            }
            _ => UsbTransition::None,
        }
    }
}

impl IsrSafe for UsbMonitor {}
