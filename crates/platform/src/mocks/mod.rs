//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::power::PowerError;
use crate::*;

/// One recorded call on [`MockLowPower`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    /// `deinit_peripheral`
    Deinit(PeripheralId),
    /// `reinit_peripheral`
    Reinit(PeripheralId),
    /// `disable_dma`
    DisableDma,
    /// `enable_dma`
    EnableDma,
    /// `suspend_tick`
    SuspendTick,
    /// `resume_tick`
    ResumeTick,
    /// `arm_wake_uart`
    ArmWakeUart,
    /// `resume_wake_uart`
    ResumeWakeUart,
    /// `gpio_low_power`
    GpioLowPower,
    /// `enter_stop2`
    EnterStop2,
    /// `restore_clocks`
    RestoreClocks,
}

/// Mock RTC whose time only moves when a test (or [`MockLowPower`]) says so.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct MockRtc {
    now: Arc<AtomicU64>,
}

impl MockRtc {
    /// Create a new mock RTC starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Advance the clock
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl RtcClock for MockRtc {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Mock low-power HAL that records the order of every call
pub struct MockLowPower {
    /// Reported debugger state
    pub debugger: bool,
    /// Reported USB presence
    pub usb: UsbPresence,
    /// Whether `enter_stop2` reports that the core actually stopped
    pub stop_enters: bool,
    /// How long a successful STOP2 lasts on the RTC, unless the wakeup
    /// timer fires first
    pub stop_duration_ms: u64,
    /// Peripheral whose reinit fails, if any
    pub failing_reinit: Option<PeripheralId>,
    rtc: Option<MockRtc>,
    ops: heapless::Vec<PowerOp, 64>,
}

impl MockLowPower {
    /// Create a mock with no debugger, USB absent, and STOP2 that succeeds
    pub fn new() -> Self {
        Self {
            debugger: false,
            usb: UsbPresence::Absent,
            stop_enters: true,
            stop_duration_ms: 0,
            failing_reinit: None,
            rtc: None,
            ops: heapless::Vec::new(),
        }
    }

    /// Advance `rtc` by `stop_duration_ms` whenever STOP2 is entered
    pub fn with_rtc(mut self, rtc: MockRtc, stop_duration_ms: u64) -> Self {
        self.rtc = Some(rtc);
        self.stop_duration_ms = stop_duration_ms;
        self
    }

    /// Recorded calls, oldest first
    pub fn ops(&self) -> &[PowerOp] {
        &self.ops
    }

    /// Forget recorded calls
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Whether STOP2 entry was attempted
    pub fn stop_attempted(&self) -> bool {
        self.ops.contains(&PowerOp::EnterStop2)
    }

    fn record(&mut self, op: PowerOp) {
        // Log is bounded; tests that overflow it only lose the tail.
        let _ = self.ops.push(op);
    }
}

impl Default for MockLowPower {
    fn default() -> Self {
        Self::new()
    }
}

impl LowPowerHal for MockLowPower {
    fn debugger_attached(&self) -> bool {
        self.debugger
    }

    fn usb_presence(&self) -> UsbPresence {
        self.usb
    }

    fn deinit_peripheral(&mut self, id: PeripheralId) {
        self.record(PowerOp::Deinit(id));
    }

    fn reinit_peripheral(&mut self, id: PeripheralId) -> Result<(), PowerError> {
        self.record(PowerOp::Reinit(id));
        if self.failing_reinit == Some(id) {
            return Err(PowerError::PeripheralInit(id));
        }
        Ok(())
    }

    fn disable_dma(&mut self) {
        self.record(PowerOp::DisableDma);
    }

    fn enable_dma(&mut self) -> Result<(), PowerError> {
        self.record(PowerOp::EnableDma);
        Ok(())
    }

    fn suspend_tick(&mut self) {
        self.record(PowerOp::SuspendTick);
    }

    fn resume_tick(&mut self) {
        self.record(PowerOp::ResumeTick);
    }

    fn arm_wake_uart(&mut self) {
        self.record(PowerOp::ArmWakeUart);
    }

    fn resume_wake_uart(&mut self) {
        self.record(PowerOp::ResumeWakeUart);
    }

    fn gpio_low_power(&mut self) {
        self.record(PowerOp::GpioLowPower);
    }

    fn enter_stop2(&mut self, max_ms: u32) -> bool {
        self.record(PowerOp::EnterStop2);
        if self.stop_enters {
            if let Some(rtc) = &self.rtc {
                let slept = match max_ms {
                    0 => self.stop_duration_ms,
                    cap => self.stop_duration_ms.min(u64::from(cap)),
                };
                rtc.advance(slept);
            }
        }
        self.stop_enters
    }

    fn restore_clocks(&mut self) -> Result<(), PowerError> {
        self.record(PowerOp::RestoreClocks);
        Ok(())
    }
}

/// Mock serial transmitter
///
/// Captures every byte written and the size of every `write` call.
pub struct MockSerialWriter {
    bytes: heapless::Vec<u8, 4096>,
    writes: heapless::Vec<usize, 256>,
    /// When set, `write` accepts nothing (returns `Ok(0)`), like a busy UART
    pub stalled: bool,
    /// When set, `write` fails with an I/O error
    pub failing: bool,
}

impl MockSerialWriter {
    /// Create new mock writer
    pub fn new() -> Self {
        Self {
            bytes: heapless::Vec::new(),
            writes: heapless::Vec::new(),
            stalled: false,
            failing: false,
        }
    }

    /// All bytes written so far
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of each accepted write call
    pub fn write_sizes(&self) -> &[usize] {
        &self.writes
    }

    /// Written bytes as UTF-8, lossy
    pub fn text(&self) -> std::string::String {
        std::string::String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Forget captured output
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.writes.clear();
    }
}

impl Default for MockSerialWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl embedded_io::ErrorType for MockSerialWriter {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io_async::Write for MockSerialWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.failing {
            return Err(embedded_io::ErrorKind::Other);
        }
        if self.stalled || buf.is_empty() {
            return Ok(0);
        }
        let room = self.bytes.capacity().saturating_sub(self.bytes.len());
        let n = buf.len().min(room);
        let accepted = buf.get(..n).unwrap_or_default();
        self.bytes
            .extend_from_slice(accepted)
            .map_err(|_| embedded_io::ErrorKind::OutOfMemory)?;
        let _ = self.writes.push(n);
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Mock PDM microphone
///
/// Fills every block with a fixed byte pattern.
pub struct MockPdm {
    pattern: u8,
    /// Number of upcoming reads that fail
    pub pending_errors: u8,
    blocks: u32,
}

impl MockPdm {
    /// Create a source that produces `pattern` in every byte
    pub fn new(pattern: u8) -> Self {
        Self {
            pattern,
            pending_errors: 0,
            blocks: 0,
        }
    }

    /// Change the fill pattern
    pub fn set_pattern(&mut self, pattern: u8) {
        self.pattern = pattern;
    }

    /// Blocks delivered successfully
    pub fn blocks(&self) -> u32 {
        self.blocks
    }
}

impl PdmSource for MockPdm {
    async fn read_block(&mut self, block: &mut [u8]) -> Result<(), CaptureError> {
        if self.pending_errors > 0 {
            self.pending_errors = self.pending_errors.saturating_sub(1);
            return Err(CaptureError::Overrun);
        }
        block.fill(self.pattern);
        self.blocks = self.blocks.saturating_add(1);
        Ok(())
    }
}

/// Mock system control
#[derive(Debug, Default)]
pub struct MockSystem {
    /// Number of `restart` calls
    pub restarts: u32,
    /// Number of `enter_bootloader` calls
    pub bootloader_jumps: u32,
    /// Report returned by `self_test`
    pub report: SelfTestReport,
}

impl MockSystem {
    /// Create new mock system whose self test passes 4 checks
    pub fn new() -> Self {
        Self {
            restarts: 0,
            bootloader_jumps: 0,
            report: SelfTestReport {
                checks: 4,
                failures: 0,
            },
        }
    }
}

impl SystemControl for MockSystem {
    fn restart(&mut self) {
        self.restarts = self.restarts.saturating_add(1);
    }

    fn enter_bootloader(&mut self) {
        self.bootloader_jumps = self.bootloader_jumps.saturating_add(1);
    }

    fn self_test(&mut self) -> SelfTestReport {
        self.report
    }
}

/// Mock LED pin recording each level written
#[derive(Debug, Default)]
pub struct MockLed {
    levels: heapless::Vec<bool, 128>,
}

impl MockLed {
    /// Create new mock LED
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels written, oldest first (`true` = lit)
    pub fn levels(&self) -> &[bool] {
        &self.levels
    }

    /// Current level
    pub fn is_lit(&self) -> bool {
        self.levels.last().copied().unwrap_or(false)
    }
}

impl embedded_hal::digital::ErrorType for MockLed {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for MockLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let _ = self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let _ = self.levels.push(true);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn low_power_mock_records_in_order() {
        let mut hal = MockLowPower::new();
        hal.disable_dma();
        hal.suspend_tick();
        assert!(hal.enter_stop2(0));
        assert_eq!(
            hal.ops(),
            &[PowerOp::DisableDma, PowerOp::SuspendTick, PowerOp::EnterStop2]
        );
    }

    #[test]
    fn stop_advances_shared_rtc() {
        let rtc = MockRtc::new(1_000);
        let mut hal = MockLowPower::new().with_rtc(rtc.clone(), 250);
        hal.enter_stop2(0);
        assert_eq!(rtc.now_ms(), 1_250);
    }

    #[test]
    fn wakeup_timer_caps_stop() {
        let rtc = MockRtc::new(0);
        let mut hal = MockLowPower::new().with_rtc(rtc.clone(), 250);
        hal.enter_stop2(40);
        assert_eq!(rtc.now_ms(), 40);
    }

    #[test]
    fn failed_stop_leaves_rtc_alone() {
        let rtc = MockRtc::new(1_000);
        let mut hal = MockLowPower::new().with_rtc(rtc.clone(), 250);
        hal.stop_enters = false;
        assert!(!hal.enter_stop2(0));
        assert_eq!(rtc.now_ms(), 1_000);
    }

    #[tokio::test]
    async fn serial_writer_captures_bytes() {
        use embedded_io_async::Write;
        let mut w = MockSerialWriter::new();
        w.write_all(b"hello").await.unwrap();
        assert_eq!(w.bytes(), b"hello");
        assert_eq!(w.write_sizes(), &[5]);
    }

    #[tokio::test]
    async fn pdm_mock_injects_errors() {
        let mut pdm = MockPdm::new(0xFF);
        pdm.pending_errors = 1;
        let mut block = [0u8; 8];
        assert_eq!(pdm.read_block(&mut block).await, Err(CaptureError::Overrun));
        assert_eq!(pdm.read_block(&mut block).await, Ok(()));
        assert_eq!(block, [0xFF; 8]);
    }
}
