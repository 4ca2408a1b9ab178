//! Power management abstraction
//!
//! The STOP2 entry and exit sequence is owned by the firmware sleep manager;
//! this trait exposes only the register-level steps it sequences, so the
//! ordering can be verified against a recording mock on the host.

use core::fmt;

use crate::peripheral::PeripheralId;

/// Physical USB presence as sensed on the VBUS detect pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbPresence {
    /// VBUS detected
    Present,
    /// VBUS absent
    Absent,
    /// Board has no detect pin, or it could not be read
    Unknown,
}

/// Failures while bringing hardware back up.
///
/// All of these are unrecoverable for the firmware: a board whose clock tree
/// or DMA controller will not come back is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// PLL did not relock after STOP2
    ClockRestore,
    /// DMA controller init failed
    DmaInit,
    /// A peripheral failed to reinitialise
    PeripheralInit(PeripheralId),
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClockRestore => f.write_str("clock restore failed"),
            Self::DmaInit => f.write_str("dma init failed"),
            Self::PeripheralInit(id) => write!(f, "{} init failed", id.name()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PowerError {}

/// Low-power primitives the sleep manager sequences around STOP2.
///
/// Implementations perform exactly one hardware step per call and never
/// decide policy. Everything here runs from task context with interrupts
/// enabled, except [`enter_stop2`][Self::enter_stop2], which blocks in WFI.
pub trait LowPowerHal {
    /// Whether a debug probe is attached (DBGMCU / DHCSR C_DEBUGEN).
    fn debugger_attached(&self) -> bool;

    /// USB VBUS presence.
    fn usb_presence(&self) -> UsbPresence;

    /// Tear a peripheral down ahead of STOP2.
    fn deinit_peripheral(&mut self, id: PeripheralId);

    /// Bring a peripheral back after STOP2.
    fn reinit_peripheral(&mut self, id: PeripheralId) -> Result<(), PowerError>;

    /// Disable the DMA controllers.
    fn disable_dma(&mut self);

    /// Re-enable the DMA controllers.
    fn enable_dma(&mut self) -> Result<(), PowerError>;

    /// Stop the OS tick interrupt and clear any pending tick.
    fn suspend_tick(&mut self);

    /// Restart the OS tick interrupt.
    fn resume_tick(&mut self);

    /// Arm the retained UART so a start bit wakes the core from STOP2.
    fn arm_wake_uart(&mut self);

    /// Return the retained UART to normal receive operation.
    fn resume_wake_uart(&mut self);

    /// Put every GPIO into its lowest-power configuration.
    fn gpio_low_power(&mut self);

    /// Arm the RTC wakeup timer for `max_ms` (0 = no timer) and execute the
    /// STOP2 entry instruction.
    ///
    /// Returns `true` if the core actually stopped. A pending event can make
    /// WFI fall straight through. The clock tree is then intact and no time
    /// was lost, so the caller must neither restore clocks nor step the
    /// clock. Torn-down peripherals still need bringing back.
    fn enter_stop2(&mut self, max_ms: u32) -> bool;

    /// Re-lock the PLL and restore the system clock tree.
    fn restore_clocks(&mut self) -> Result<(), PowerError>;
}

/// Millisecond clock backed by the RTC, which keeps running through STOP2.
pub trait RtcClock {
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;
}

impl<T: RtcClock + ?Sized> RtcClock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
