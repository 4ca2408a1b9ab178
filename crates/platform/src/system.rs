//! System control: reset, bootloader, self test

use core::fmt;

/// Outcome of the power-on self test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestReport {
    /// Number of checks executed
    pub checks: u16,
    /// Number of checks that failed
    pub failures: u16,
}

impl SelfTestReport {
    /// Whether every check passed.
    pub const fn passed(&self) -> bool {
        self.failures == 0
    }
}

impl fmt::Display for SelfTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "POST: {} checks passed", self.checks)
        } else {
            write!(f, "POST: {} of {} checks FAILED", self.failures, self.checks)
        }
    }
}

/// Reset, bootloader jump, and the board self test.
///
/// On hardware `restart` and `enter_bootloader` never return. Host
/// implementations record the request and return so tests can observe it.
pub trait SystemControl {
    /// Reset the MCU.
    fn restart(&mut self);

    /// Jump to the ROM bootloader.
    fn enter_bootloader(&mut self);

    /// Run the board continuity/self test.
    fn self_test(&mut self) -> SelfTestReport;
}
